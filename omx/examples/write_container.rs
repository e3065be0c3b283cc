//! Build a small skim container: shape, lookups, a matrix and a CSV import

use omx::{ContainerConfig, CsvSource, DenseArray, ImportConfig, Mode, OpenMatrix};
use std::time::Instant;

fn main() -> omx::Result<()> {
    let path = "example_skims.omx";
    let zones: Vec<i64> = vec![101, 102, 103, 104];
    let n = zones.len() as u64;

    println!("Creating container '{path}' with {n} zones...");
    let config = ContainerConfig::default()
        .with_mode(Mode::Create)
        .with_compression(3);
    let mut omx = OpenMatrix::open_with(path, config)?;
    omx.set_shape(n, n)?;

    omx.add_lookup("taz", zones.clone())?;
    omx.add_lookup("district", vec!["north", "north", "south", "south"])?;

    // Straight-line distance between zone centroids
    let distance: Vec<f64> = (0..n)
        .flat_map(|o| (0..n).map(move |d| (o as f64 - d as f64).abs() * 1.5))
        .collect();
    omx.put("distance", &DenseArray::new(vec![n, n], distance)?, true)?;

    // Import a sparse travel-time table keyed by 1-based positions
    let table = "o,d,time,cost\n1,2,12.5,3\n2,1,11.0,3\n3,4,7.25,2\n4,3,8.0,2\n";
    let mut source = CsvSource::from_reader(table.as_bytes());
    let start = Instant::now();
    let summary = omx.import_table(&mut source, &ImportConfig::default().with_chunk_size(2))?;
    println!(
        "Imported {} records in {} chunks in {:?}",
        summary.records,
        summary.chunks,
        start.elapsed()
    );

    println!("Matrices: {:?}", omx.matrix_names());
    println!("Lookups: {:?}", omx.lookup_names());
    println!("\nRun 'cargo run --example read_container' to read it back!");
    Ok(())
}
