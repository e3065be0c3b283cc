use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use omx::{ContainerConfig, CsvSource, DataType, ImportConfig, LookupArray, OpenMatrix};

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(about = "OMX CLI - Inspect and populate open matrix containers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show container shape, matrices and lookups
    Info {
        /// Container directory
        container: PathBuf,
    },
    /// Set the shape of a container that holds no matrices, creating it if needed
    SetShape {
        container: PathBuf,
        rows: u64,
        cols: u64,
    },
    /// Import an (origin, destination, value...) CSV table
    Import {
        container: PathBuf,
        /// CSV file with a header row
        table: PathBuf,

        /// Identifiers in the table start at 0
        #[arg(long)]
        zero_based: bool,

        /// Records per chunk
        #[arg(long, default_value_t = omx::config::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Element type for new matrices (f32, f64, i32, i64, u32, u64)
        #[arg(long, default_value = "f32")]
        dtype: String,

        /// Stage the whole table before writing any matrix
        #[arg(long)]
        staged: bool,

        /// Value column to matrix mapping (format: column=matrix)
        #[arg(long = "map", value_name = "COLUMN=MATRIX")]
        map: Vec<String>,

        /// Compress newly written matrices with zstd at this level
        #[arg(long)]
        compress: Option<i32>,
    },
    /// Map lookup values to matrix positions
    Resolve {
        container: PathBuf,
        lookup: String,
        values: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let start_time = std::time::Instant::now();

    match cli.command {
        Commands::Info { container } => handle_info(container)?,
        Commands::SetShape {
            container,
            rows,
            cols,
        } => {
            let mut omx = OpenMatrix::open(&container)?;
            omx.set_shape(rows, cols)?;
            println!("Shape set to {rows} x {cols}");
        }
        Commands::Import {
            container,
            table,
            zero_based,
            chunk_size,
            dtype,
            staged,
            map,
            compress,
        } => {
            let default_type = DataType::from_name(&dtype)
                .ok_or_else(|| format!("unknown element type '{dtype}'"))?;
            let mut config = ImportConfig::default()
                .with_chunk_size(chunk_size)
                .with_default_type(default_type);
            if zero_based {
                config = config.zero_based();
            }
            if !map.is_empty() {
                config = config.with_column_map(parse_column_map(&map)?);
            }
            let mut container_config = ContainerConfig::default();
            if let Some(level) = compress {
                container_config = container_config.with_compression(level);
            }

            let mut omx = OpenMatrix::open_with(&container, container_config)?;
            let mut source = CsvSource::from_path(&table)?;
            let summary = if staged {
                omx.import_table_staged(&mut source, &config)?
            } else {
                omx.import_table(&mut source, &config)?
            };
            println!(
                "Imported {} records in {} chunks into: {}",
                summary.records,
                summary.chunks,
                summary.destinations.join(", ")
            );
        }
        Commands::Resolve {
            container,
            lookup,
            values,
        } => {
            let omx = OpenMatrix::open_read(&container)?;
            let element = omx.lookup_element_type(&lookup)?;
            let queries = LookupArray::parse(element, &values)?;
            let positions = omx.resolve_array(&lookup, &queries)?;
            for (value, position) in values.iter().zip(positions) {
                println!("{value} -> {position}");
            }
        }
    }

    let elapsed = start_time.elapsed();
    eprintln!("Completed in {elapsed:.2?}");

    Ok(())
}

fn handle_info(container: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let omx = OpenMatrix::open_read(&container)?;

    println!("Container: {}", omx.path().display());
    println!("   Version: {}", omx.version());
    match omx.shape_registry().require() {
        Ok(shape) => println!("   Shape: {shape}"),
        Err(_) => println!("   Shape: unset"),
    }

    let matrices = omx.matrix_names();
    println!("\nMatrices ({}):", matrices.len());
    for name in &matrices {
        let handle = omx.get(name)?;
        println!(
            "   {name}: {:?} {} ({})",
            handle.dims(),
            handle.data_type(),
            handle.codec()
        );
    }

    let lookups = omx.lookup_names();
    println!("\nLookups ({}):", lookups.len());
    for name in &lookups {
        let values = omx.get_lookup(name)?;
        println!("   {name}: {} x {}", values.len(), values.element_type());
    }

    Ok(())
}

/// Parse `column=matrix` pairs
fn parse_column_map(pairs: &[String]) -> Result<Vec<(String, String)>, String> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(column, matrix)| (column.trim().to_string(), matrix.trim().to_string()))
                .filter(|(column, matrix)| !column.is_empty() && !matrix.is_empty())
                .ok_or_else(|| format!("invalid mapping '{pair}', expected column=matrix"))
        })
        .collect()
}
