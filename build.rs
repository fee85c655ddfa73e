//! Embeds the source revision as `GIT_HASH` for the startup log and `/health`

use std::process::Command;

fn main() {
    // Short hash, suffixed with `-dirty` when the work tree has local changes
    let describe = Command::new("git").args(["describe", "--always", "--dirty"]).output();

    let revision = match describe {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        _ => "unknown".to_string(),
    };

    println!("cargo:rustc-env=GIT_HASH={revision}");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
}
