// Publishes the C header to $OUT_DIR.
//
// With a `cbindgen` binary on PATH the header is regenerated from src/lib.rs
// and copied back to include/tonegen.h; otherwise the checked-in copy is used.

use std::{env, fs, path::PathBuf, process::Command};

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=include/tonegen.h");

    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    let checked_in = crate_dir.join("include").join("tonegen.h");
    let generated = out_dir.join("tonegen.h");

    let regenerated = Command::new("cbindgen")
        .args(["--crate", "tonegen-ffi", "--lang", "C", "--output"])
        .arg(&generated)
        .current_dir(&crate_dir)
        .status()
        .is_ok_and(|s| s.success());

    if regenerated {
        let _ = fs::copy(&generated, &checked_in);
        println!("cargo:warning=tonegen-ffi: header generated with cbindgen");
    } else {
        fs::copy(&checked_in, &generated).expect("failed to copy include/tonegen.h to OUT_DIR");
    }
    println!("cargo:include={}", out_dir.display());
}
