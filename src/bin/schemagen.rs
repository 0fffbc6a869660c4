//! Config schema generator
//!
//! Prints the JSON schema of the runtime config file.
//!
//! Usage: cargo run --bin schemagen > deploy/config.schema.json

use resource_runtime::config::RuntimeConfig;

fn main() -> anyhow::Result<()> {
    let schema = schemars::schema_for!(RuntimeConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
