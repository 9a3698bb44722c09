use std::process::Command;

fn main() {
    let built_at = command_stdout("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]);
    println!(
        "cargo:rustc-env=BACKOFFICE_BUILT_AT={}",
        built_at.as_deref().unwrap_or("unknown")
    );

    let git_sha = command_stdout("git", &["rev-parse", "--short", "HEAD"]);
    println!(
        "cargo:rustc-env=BACKOFFICE_GIT_SHA={}",
        git_sha.as_deref().unwrap_or("unknown")
    );

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Trimmed stdout of a successful command, `None` when the tool is missing
/// or exits non-zero (e.g. building from a source tarball).
fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
