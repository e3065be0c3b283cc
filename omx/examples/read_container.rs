//! Read matrices back through their lookups

use omx::{LookupValue, OpenMatrix};

fn main() -> omx::Result<()> {
    let path = "example_skims.omx";

    if !std::path::Path::new(path).exists() {
        println!("Container '{path}' not found!");
        println!("   Run 'cargo run --example write_container' first");
        return Ok(());
    }

    let mut omx = OpenMatrix::open_read(path)?;
    let (rows, cols) = omx.shape();
    println!("Container '{path}': {rows} x {cols}, version {}", omx.version());

    for name in omx.matrix_names() {
        let handle = omx.get(&name)?;
        println!("   {name}: {} ({})", handle.data_type(), handle.codec());
    }

    // Zone ids to positions
    let positions = omx.resolve("taz", &[103i64, 101])?;
    let time = omx.get_matrix("time")?;
    let (o, d) = (positions[1] as u64, positions[0] as u64);
    println!(
        "\nTime from zone 101 to zone 103: {:?}",
        time.get_f64(&[o, d])
    );

    // Positions back to labels
    let districts = omx.reverse("district")?;
    for position in 0..districts.len() {
        if let Some(LookupValue::Label(label)) = districts.get(position) {
            println!("   position {position} is in district {label}");
        }
    }

    let distance = omx.matrix::<f64>("distance")?;
    let total: f64 = distance.as_slice().iter().sum();
    println!("\nTotal distance over all pairs: {total:.2}");
    Ok(())
}
