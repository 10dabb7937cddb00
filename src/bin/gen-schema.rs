use abtest_engine::model::Experiment;
use schemars::schema_for;

fn main() -> anyhow::Result<()> {
    // Print the JSON Schema of a persisted experiment record
    // Use: cargo run --bin gen-schema > experiment.schema.json
    let schema = schema_for!(Experiment);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
