use charuco_intrinsic_calibration::resolution::{ResolutionTableConfig, build_resolution_table};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let table = build_resolution_table(&ResolutionTableConfig::k16vga())?;
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}
