use std::path::PathBuf;

use bfres::ResFile;
use bfres::data::loader::{LoaderOptions, SignaturePolicy};
use bfres::data::wrappers::mmap::MappedFile;
use clap::Parser;
use itertools::Itertools;
use rootcause::prelude::*;
use tracing::info;

/// Inspect BFRES archives
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Dump every archive as JSON instead of a summary
    #[clap(short, long)]
    json: bool,

    /// Log signature mismatches instead of failing
    #[clap(short, long)]
    lenient: bool,

    /// .bfres file(s)
    files: Vec<PathBuf>,
}

fn summarize(file: &ResFile) {
    println!(
        "{} (version {}, {:?}, {:?})",
        file.name, file.version, file.generation, file.byte_order
    );
    for (name, model) in file.models.iter() {
        println!(
            "  model {name}: {} bones [{}], {} shapes, {} materials",
            model.skeleton.bones.len(),
            model.skeleton.bones.keys().join(", "),
            model.shapes.count(),
            model.materials.count(),
        );
    }
    for (name, anim) in file.skeletal_anims.iter() {
        println!(
            "  skeletal anim {name}: {} frames, bones [{}]",
            anim.frame_count,
            anim.bone_anims.iter().map(|b| b.name.as_str()).join(", "),
        );
    }
    for (name, external) in file.external_files.iter() {
        println!("  external file {name}: {} bytes", external.data.len());
    }
    if let Some(relocation) = &file.relocation_table {
        println!(
            "  relocation: {} sections, {} pointer slots",
            relocation.section_count(),
            relocation.slot_count()
        );
    }
}

fn main() -> Result<(), Report> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let options = LoaderOptions::builder()
        .signature_policy(if args.lenient {
            SignaturePolicy::Warn
        } else {
            SignaturePolicy::Strict
        })
        .build();

    for path in &args.files {
        info!(path = %path.display(), "loading archive");
        let mapped = MappedFile::open(path).context("Failed to open archive")?;
        let file = ResFile::from_bytes_with(mapped.as_ref(), options.clone())
            .context("Failed to load archive")?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&file)?);
        } else {
            summarize(&file);
        }
    }

    Ok(())
}
