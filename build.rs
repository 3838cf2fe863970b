//! Build script for ioblackbox
//!
//! Generates `include/ioblackbox.h` from `src/ffi.rs` when the `ffi` feature
//! is enabled, using the settings in `cbindgen.toml`.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=cbindgen.toml");
    println!("cargo:rerun-if-changed=src/ffi.rs");

    #[cfg(feature = "ffi")]
    {
        let crate_dir = match std::env::var("CARGO_MANIFEST_DIR") {
            Ok(dir) => std::path::PathBuf::from(dir),
            Err(_) => return,
        };

        let include_dir = crate_dir.join("include");
        std::fs::create_dir_all(&include_dir).ok();

        let config = cbindgen::Config::from_file(crate_dir.join("cbindgen.toml"))
            .unwrap_or_else(|e| {
                println!("cargo:warning=ignoring cbindgen.toml: {}", e);
                cbindgen::Config::default()
            });

        match cbindgen::Builder::new()
            .with_crate(&crate_dir)
            .with_config(config)
            .generate()
        {
            Ok(bindings) => {
                bindings.write_to_file(include_dir.join("ioblackbox.h"));
            }
            Err(e) => println!("cargo:warning=failed to generate C header: {}", e),
        }
    }
}
