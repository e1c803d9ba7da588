//! fb2mobi - FB2 to MOBI/KF8/EPUB converter

use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use fb2mobi::{read_fb2, write_epub, write_joint, write_kf8, write_mobi6};
use fb2mobi::{Book, Compression, TocEntry, Validator, WriteOptions};

#[derive(Parser)]
#[command(name = "fb2mobi")]
#[command(version, about = "FB2 to MOBI/KF8/EPUB converter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MobiType {
    /// MOBI 6 (legacy readers)
    Old,
    /// Pure KF8 (MOBI 8)
    New,
    /// Joint MOBI6+KF8 file
    Both,
}

#[derive(Subcommand)]
enum Command {
    /// Convert an FB2 file to MOBI/AZW3/EPUB (format from the output extension)
    Convert {
        /// Input file (.fb2 or zipped .fb2.zip)
        input: String,

        /// Output file (.mobi, .azw3, or .epub)
        output: String,

        /// MOBI flavor to produce
        #[arg(long, value_enum, default_value = "old")]
        mobi_type: MobiType,

        /// Store text uncompressed
        #[arg(long)]
        no_compression: bool,

        /// Skip the table-of-contents index
        #[arg(long)]
        no_toc: bool,

        /// Override the book title
        #[arg(long)]
        title: Option<String>,

        /// Check the produced file structure after writing
        #[arg(long)]
        validate: bool,
    },

    /// Show book metadata and structure
    Info {
        /// Input file (.fb2 or zipped .fb2.zip)
        file: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Convert {
            input,
            output,
            mobi_type,
            no_compression,
            no_toc,
            title,
            validate,
        } => convert(
            &input,
            &output,
            mobi_type,
            no_compression,
            no_toc,
            title,
            validate,
        ),
        Command::Info { file, json } => show_info(&file, json).map(|_| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn convert(
    input: &str,
    output: &str,
    mobi_type: MobiType,
    no_compression: bool,
    no_toc: bool,
    title: Option<String>,
    validate: bool,
) -> Result<ExitCode, String> {
    let book = read_fb2(input).map_err(|e| format!("{input}: {e}"))?;

    let mut options = WriteOptions {
        title_override: title,
        generate_toc: !no_toc,
        cover_image: book.cover_data().map(|d| d.to_vec()),
        ..WriteOptions::default()
    };
    if no_compression {
        options.compression = Compression::None;
    }

    let extension = Path::new(output)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let write_result = (|| -> fb2mobi::Result<()> {
        let mut sink = std::fs::File::create(output)?;
        match extension.as_str() {
            "epub" => write_epub(&book, &mut sink),
            _ => match mobi_type {
                MobiType::Old => write_mobi6(&book, options.clone(), &mut sink),
                MobiType::New => write_kf8(&book, options.clone(), &mut sink),
                MobiType::Both => {
                    options.kf8_boundary = true;
                    write_joint(&book, options.clone(), &mut sink)
                }
            },
        }
    })();

    if let Err(e) = write_result {
        // A failed conversion leaves undefined bytes behind.
        let _ = std::fs::remove_file(output);
        return Err(format!("{output}: {e}"));
    }

    if validate && extension != "epub" {
        let data = std::fs::read(output).map_err(|e| format!("{output}: {e}"))?;
        let mut validator = Validator::new(&data);
        if !validator.validate() {
            eprint!("{validator}");
            return Ok(ExitCode::from(2));
        }
        for warning in validator.warnings() {
            eprintln!("warning: {warning}");
        }
    }

    Ok(ExitCode::SUCCESS)
}

// JSON output structures

#[derive(Serialize)]
struct BookInfo {
    file: String,
    metadata: MetadataInfo,
    toc: Vec<TocInfo>,
    resources: Vec<ResourceInfo>,
}

#[derive(Serialize)]
struct MetadataInfo {
    title: String,
    authors: Vec<String>,
    language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    series: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    genres: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cover: Option<String>,
}

#[derive(Serialize)]
struct TocInfo {
    label: String,
    href: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<TocInfo>,
}

#[derive(Serialize)]
struct ResourceInfo {
    id: String,
    media_type: String,
    size: usize,
}

fn show_info(path: &str, json: bool) -> Result<(), String> {
    let book = read_fb2(path).map_err(|e| format!("{path}: {e}"))?;

    if json {
        print_json(&book, path)
    } else {
        print_human(&book, path);
        Ok(())
    }
}

fn print_json(book: &Book, path: &str) -> Result<(), String> {
    let meta = &book.metadata;
    let info = BookInfo {
        file: path.to_string(),
        metadata: MetadataInfo {
            title: meta.title.clone(),
            authors: meta.authors.iter().map(|a| a.full_name()).collect(),
            language: meta.language.clone(),
            publisher: meta.publisher.clone(),
            isbn: meta.isbn.clone(),
            year: meta.year.clone(),
            series: meta
                .series
                .as_ref()
                .map(|s| format!("{} #{}", s.name, s.index)),
            genres: meta.genres.clone(),
            annotation: meta.annotation.clone(),
            cover: meta.cover_id.clone(),
        },
        toc: book.toc.iter().map(toc_to_info).collect(),
        resources: book
            .resources
            .values()
            .map(|r| ResourceInfo {
                id: r.id.clone(),
                media_type: r.media_type.clone(),
                size: r.data.len(),
            })
            .collect(),
    };

    let json = serde_json::to_string_pretty(&info).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn toc_to_info(entry: &TocEntry) -> TocInfo {
    TocInfo {
        label: entry.label.clone(),
        href: entry.href.clone(),
        children: entry.children.iter().map(toc_to_info).collect(),
    }
}

fn print_human(book: &Book, path: &str) {
    let meta = &book.metadata;
    println!("File: {path}");
    println!("Title: {}", meta.title);
    if !meta.authors.is_empty() {
        println!("Authors: {}", meta.author_line());
    }
    if !meta.language.is_empty() {
        println!("Language: {}", meta.language);
    }
    if let Some(ref publisher) = meta.publisher {
        println!("Publisher: {publisher}");
    }
    if let Some(ref isbn) = meta.isbn {
        println!("ISBN: {isbn}");
    }
    if let Some(ref year) = meta.year {
        println!("Year: {year}");
    }
    if let Some(ref series) = meta.series {
        println!("Series: {} #{}", series.name, series.index);
    }
    if !meta.genres.is_empty() {
        println!("Genres: {}", meta.genres.join(", "));
    }
    if let Some(ref annotation) = meta.annotation {
        let annotation = annotation.trim();
        if annotation.len() > 200 {
            let mut cut = 200;
            while !annotation.is_char_boundary(cut) {
                cut -= 1;
            }
            println!("Annotation: {}...", &annotation[..cut]);
        } else {
            println!("Annotation: {annotation}");
        }
    }

    println!("\nTable of Contents ({} entries):", book.flat_toc().len());
    print_toc_human(&book.toc, 1);

    println!("\nResources ({}):", book.resources.len());
    for resource in book.resources.values() {
        println!("  {} ({}, {} bytes)", resource.id, resource.media_type, resource.data.len());
    }
}

fn print_toc_human(entries: &[TocEntry], depth: usize) {
    for entry in entries {
        let indent = "  ".repeat(depth);
        println!("{}{} -> {}", indent, entry.label, entry.href);
        if !entry.children.is_empty() {
            print_toc_human(&entry.children, depth + 1);
        }
    }
}
