//! Read-only dumps of Nimble files: schema, stripes, streams and content.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use nimble::{ReadParams, Reader};
use nimble_common::MemoryPool;
use nimble_error::NimbleResult;
use nimble_schema::SchemaNode;
use nimble_tablet::{LocalReadFile, ReadFile, Tablet};

#[derive(clap::Parser)]
#[command(name = "nimble", about = "Inspect Nimble files")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Print row counts, stripe counts and metadata.
    Info { file: PathBuf },
    /// Print the schema tree.
    Schema { file: PathBuf },
    /// Print the stripe index.
    Stripes { file: PathBuf },
    /// Print the stream table of one stripe.
    Streams {
        file: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        stripe: usize,
    },
    /// Print decoded rows.
    Content {
        file: PathBuf,
        #[arg(short, long, default_value_t = 10)]
        rows: usize,
    },
    /// Print the captured encoding layout tree, if the file carries one.
    Layout { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Usage errors exit with -1 (255), structural errors with 1.
            return ExitCode::from(255);
        }
    };
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

fn open(path: &PathBuf) -> NimbleResult<Arc<dyn ReadFile>> {
    Ok(Arc::new(LocalReadFile::open(path)?))
}

fn run(cli: Cli) -> NimbleResult<()> {
    match cli.command {
        Commands::Info { file } => {
            let tablet = Tablet::open(open(&file)?)?;
            println!("rows: {}", tablet.row_count());
            println!("stripes: {}", tablet.stripe_count());
            for (key, value) in tablet.metadata() {
                println!("metadata: {key} = {value}");
            }
        }
        Commands::Schema { file } => {
            let tablet = Tablet::open(open(&file)?)?;
            print_schema(tablet.schema(), "", 0);
        }
        Commands::Stripes { file } => {
            let tablet = Tablet::open(open(&file)?)?;
            println!("{:>8} {:>12} {:>12} {:>8}", "stripe", "offset", "size", "rows");
            for stripe in 0..tablet.stripe_count() {
                println!(
                    "{:>8} {:>12} {:>12} {:>8}",
                    stripe,
                    tablet.stripe_offset(stripe),
                    tablet
                        .stream_sizes(stripe)
                        .iter()
                        .map(|s| u64::from(*s))
                        .sum::<u64>(),
                    tablet.stripe_row_count(stripe),
                );
            }
        }
        Commands::Streams { file, stripe } => {
            let tablet = Tablet::open(open(&file)?)?;
            if stripe >= tablet.stripe_count() {
                nimble_error::nimble_bail!(
                    "stripe {} out of range ({} stripes)",
                    stripe,
                    tablet.stripe_count()
                );
            }
            let offsets = tablet.stream_offsets(stripe);
            let sizes = tablet.stream_sizes(stripe);
            println!("{:>8} {:>12} {:>12}", "stream", "offset", "size");
            for (id, (offset, size)) in offsets.iter().zip(&sizes).enumerate() {
                if *size > 0 {
                    println!("{id:>8} {offset:>12} {size:>12}");
                }
            }
        }
        Commands::Content { file, rows } => {
            let pool = MemoryPool::default();
            let mut reader = Reader::new(&pool, open(&file)?, ReadParams::default())?;
            let mut printed = 0usize;
            while printed < rows {
                let batch = reader.next(rows - printed)?;
                if batch.row_count == 0 {
                    break;
                }
                println!("batch of {} rows", batch.row_count);
                for (index, column) in batch.columns().iter().enumerate() {
                    println!("  column {index}: {} rows, {} present", column.row_count, column.present_count());
                }
                printed += batch.row_count;
            }
        }
        Commands::Layout { file } => {
            let tablet = Tablet::open(open(&file)?)?;
            match tablet.layout_tree() {
                None => println!("no encoding layout tree"),
                Some(tree) => print_layout(tree, 0),
            }
        }
    }
    Ok(())
}

fn print_schema(node: &SchemaNode, name: &str, depth: usize) {
    let indent = "  ".repeat(depth);
    let label = if name.is_empty() {
        String::new()
    } else {
        format!("{name}: ")
    };
    match node {
        SchemaNode::Scalar { kind, values } => {
            println!("{indent}{label}{kind} (stream {values})");
        }
        SchemaNode::Array { lengths, elements } => {
            println!("{indent}{label}array (lengths {lengths})");
            print_schema(elements, "", depth + 1);
        }
        SchemaNode::ArrayWithOffsets {
            offsets,
            lengths,
            elements,
        } => {
            println!("{indent}{label}offsets-array (offsets {offsets}, lengths {lengths})");
            print_schema(elements, "", depth + 1);
        }
        SchemaNode::Map {
            lengths,
            keys,
            values,
        } => {
            println!("{indent}{label}map (lengths {lengths})");
            print_schema(keys, "keys", depth + 1);
            print_schema(values, "values", depth + 1);
        }
        SchemaNode::SlidingWindowMap {
            offsets,
            lengths,
            keys,
            values,
        } => {
            println!("{indent}{label}sliding-window-map (offsets {offsets}, lengths {lengths})");
            print_schema(keys, "keys", depth + 1);
            print_schema(values, "values", depth + 1);
        }
        SchemaNode::Row {
            nulls,
            names,
            children,
        } => {
            println!("{indent}{label}struct (nulls {nulls})");
            for (child_name, child) in names.iter().zip(children) {
                print_schema(child, child_name, depth + 1);
            }
        }
        SchemaNode::FlatMap { nulls, children } => {
            println!("{indent}{label}flat-map (nulls {nulls})");
            for child in children {
                println!("{}  {}: in-map {}", indent, child.name, child.in_map);
                print_schema(&child.value, "", depth + 2);
            }
        }
    }
}

fn print_layout(tree: &nimble_schema::EncodingLayoutTree, depth: usize) {
    let indent = "  ".repeat(depth);
    println!(
        "{indent}{:?} '{}'",
        tree.kind(),
        tree.name()
    );
    for id in [
        nimble_schema::stream_ids::MAIN,
        nimble_schema::stream_ids::SECONDARY,
        nimble_schema::stream_ids::IN_MAP,
    ] {
        if let Some(layout) = tree.encoding_layout(id) {
            println!("{indent}  stream {id}: {}", layout.kind);
        }
    }
    for child in tree.children() {
        print_layout(child, depth + 1);
    }
}
