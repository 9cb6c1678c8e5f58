use std::process::Command;

/// Short build identifier from the enclosing git checkout, if there is one.
fn git_describe() -> Option<String> {
    let out = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let described = String::from_utf8(out.stdout).ok()?;
    let described = described.trim();
    (!described.is_empty()).then(|| described.to_owned())
}

fn main() {
    for tracked in [".git/HEAD", ".git/index", ".git/refs/tags"] {
        println!("cargo:rerun-if-changed={tracked}");
    }

    let version = git_describe()
        .unwrap_or_else(|| format!("v{}", env!("CARGO_PKG_VERSION")));
    println!("cargo:rustc-env=GIT_VERSION={version}");
}
