/// Keel build script.
///
/// Validates that the target belongs to a host family we have a backend for.
fn main() {
    // Hard gate: only the Win32 and POSIX backends exist. Fail loudly on any
    // other target rather than silently producing a crate with no `sys`.
    let family = std::env::var("CARGO_CFG_TARGET_FAMILY").unwrap_or_default();
    let supported = family
        .split(',')
        .any(|f| f == "windows" || f == "unix");
    if !supported {
        panic!(
            "Keel only builds for Windows or Unix targets \
             (CARGO_CFG_TARGET_FAMILY = {family:?})"
        );
    }

    // Only re-run the build script when it changes.
    println!("cargo:rerun-if-changed=build.rs");
}
