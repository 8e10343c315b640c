use std::env;
use std::path::PathBuf;

// ffmpeg-sys-next finds FFmpeg through pkg-config everywhere except Windows,
// where the usual source is a vcpkg install. Point the user at it early.
fn main() {
    for variable in ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"] {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    let is_windows = env::var("CARGO_CFG_TARGET_OS").is_ok_and(|os| os == "windows");
    if !is_windows || env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    match vcpkg_ffmpeg_dir() {
        Some(dir) if dir.exists() => println!(
            "cargo:warning=flowmotion: found vcpkg FFmpeg at {0}; set FFMPEG_DIR={0} to use it explicitly.",
            dir.display(),
        ),
        Some(dir) => println!(
            "cargo:warning=flowmotion: VCPKG_ROOT is set but {} does not exist.",
            dir.display(),
        ),
        None => println!(
            "cargo:warning=flowmotion: FFMPEG_DIR is not set; install FFmpeg (e.g. with vcpkg) before building on Windows."
        ),
    }
}

fn vcpkg_ffmpeg_dir() -> Option<PathBuf> {
    let root = env::var("VCPKG_ROOT").ok()?;
    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    Some(PathBuf::from(root).join("installed").join(triplet))
}
