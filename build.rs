use anyhow::Result;
use chrono::TimeZone;
use std::env;
use std::fs;
use std::process::Command;
use vergen_gitcl::{Emitter, GitclBuilder};

fn main() -> Result<()> {
    let gitcl = GitclBuilder::default()
        .describe(true, true, Some("[0-9]*"))
        .build()?;

    let gitcl_res = Emitter::default()
        .idempotent()
        .fail_on_error()
        .add_instructions(&gitcl)
        .and_then(|emitter| emitter.emit());

    if let Err(e) = gitcl_res {
        eprintln!("error occurred while generating instructions: {e:?}");
        Emitter::default().idempotent().fail_on_error().emit()?;
    }

    // Reproducible builds pin the timestamp through SOURCE_DATE_EPOCH
    let now = env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|val| val.parse::<i64>().ok())
        .and_then(|secs| chrono::Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(chrono::Utc::now);

    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let sud_version = sud_version_from_metadata().unwrap_or_else(|_| {
        sud_version_from_manifest().unwrap_or_else(|_| "unknown".to_string())
    });
    println!("cargo:rustc-env=SUD_VERSION={sud_version}");
    println!("cargo:rerun-if-changed=sud/Cargo.toml");

    Ok(())
}

/// Version of the `sud` library as resolved by cargo, local or published.
fn sud_version_from_metadata() -> Result<String> {
    let output = Command::new("cargo")
        .args(["metadata", "--format-version", "1"])
        .output()?;

    if !output.status.success() {
        anyhow::bail!("cargo metadata failed");
    }

    let metadata: serde_json::Value = serde_json::from_slice(&output.stdout)?;

    if let Some(packages) = metadata["packages"].as_array() {
        for package in packages {
            if package["name"].as_str() == Some("sud") {
                if let Some(version) = package["version"].as_str() {
                    return Ok(version.to_string());
                }
            }
        }
    }

    // Resolve ids look like "sud 0.1.0 (registry+...)"
    if let Some(nodes) = metadata["resolve"]["nodes"].as_array() {
        for node in nodes {
            let Some(id) = node["id"].as_str() else {
                continue;
            };
            let mut parts = id.split(' ');
            if parts.next() == Some("sud") {
                if let Some(version) = parts.next() {
                    return Ok(version.to_string());
                }
            }
        }
    }

    anyhow::bail!("sud package not found in metadata");
}

fn sud_version_from_manifest() -> Result<String> {
    let toml_content = fs::read_to_string("sud/Cargo.toml")?;

    for line in toml_content.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("version") {
            if let Some(value) = rest.trim_start().strip_prefix('=') {
                return Ok(value.trim().trim_matches('"').to_string());
            }
        }
    }

    anyhow::bail!("Could not find version in sud/Cargo.toml");
}
