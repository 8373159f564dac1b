// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

diesel::table! {
    pkgs (pkg) {
        pkg -> Text,
        version -> Nullable<Text>,
        release -> BigInt,
    }
}

diesel::table! {
    files (fpath) {
        fpath -> Text,
        pkg -> Text,
        sha256 -> Text,
    }
}

diesel::table! {
    dirs (dir, pkg) {
        dir -> Text,
        pkg -> Text,
    }
}

diesel::joinable!(files -> pkgs (pkg));
diesel::joinable!(dirs -> pkgs (pkg));
diesel::allow_tables_to_appear_in_same_query!(pkgs, files, dirs);
