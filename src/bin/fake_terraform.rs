// src/bin/fake_terraform.rs
// Stand-in for the terraform binary, used by the integration tests.
//
// Its version comes from a sidecar file `<exe>.version` (default 1.0.0).
// "Binary" plans it understands look like:
//
//     FAKEPLAN <version that wrote it>
//     <plan JSON>
//
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let version = own_version();

    match args.first().map(String::as_str) {
        // 1. VERSION
        Some("version") => {
            let body = serde_json::json!({
                "terraform_version": version,
                "platform": "linux_amd64",
                "provider_selections": {},
                "terraform_outdated": false
            });
            send(&body.to_string())
        }
        // 2. INIT
        Some("init") => send("Terraform has been successfully initialized!"),
        // 3. SHOW
        Some("show") => {
            let Some(plan_path) = args.iter().skip(1).find(|a| !a.starts_with('-')) else {
                return fail("Error: show requires a plan file");
            };
            let raw = match std::fs::read_to_string(plan_path) {
                Ok(raw) => raw,
                Err(e) => return fail(&format!("Error: Failed to read plan file: {}", e)),
            };
            let Some((header, body)) = raw.split_once('\n') else {
                return fail("Error: Failed to read the given file as a state or plan file");
            };
            let Some(created_by) = header.strip_prefix("FAKEPLAN ") else {
                return fail("Error: Failed to read the given file as a state or plan file");
            };
            if created_by.trim() != version {
                return fail(&format!(
                    "Error: Failed to read the given file as a state or plan file\n\n\
                     Plan read error: plan file was created by Terraform {}, but this is {}; \
                     plan files cannot be transferred between different Terraform versions",
                    created_by.trim(),
                    version
                ));
            }
            send(body.trim())
        }
        _ => fail("Error: unsupported command"),
    }
}

fn own_version() -> String {
    let sidecar = std::env::current_exe()
        .map(|exe| {
            let mut name = exe.into_os_string();
            name.push(".version");
            PathBuf::from(name)
        })
        .ok();
    sidecar
        .and_then(|path| std::fs::read_to_string(path).ok())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "1.0.0".to_string())
}

// Helper to write output + newline
fn send(out: &str) -> ExitCode {
    let mut stdout = io::stdout();
    let _ = writeln!(stdout, "{}", out);
    let _ = stdout.flush();
    ExitCode::SUCCESS
}

fn fail(message: &str) -> ExitCode {
    let _ = writeln!(io::stderr(), "{}", message);
    ExitCode::from(1)
}
