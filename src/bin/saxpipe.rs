//! saxpipe CLI: XML durch eine Filter-Pipeline schicken.

#[cfg(feature = "fast-alloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Parser, ValueEnum};
use indexmap::IndexMap;
use saxpipe::filter::{EmptyElementPolicy, PlaceholderOptions, PrettyPrintOptions};
use saxpipe::options::PipelineOptions;
use saxpipe::pipeline::run_reader;
use saxpipe::xml_writer::WriterOptions;
use std::io::{BufRead, BufReader, BufWriter, IsTerminal, Write};
use std::process;

#[derive(Parser)]
#[command(name = "saxpipe", about = "Streaming XML filter pipeline")]
struct Cli {
    /// Input file (- for stdin)
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Output file (- for stdout)
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Move all elements and attributes to the empty namespace
    #[arg(long)]
    remove_namespaces: bool,

    /// Drop namespaced elements (with their subtrees) and attributes
    #[arg(long)]
    remove_namespaced_contents: bool,

    /// Extract the first element with this name (`local` or `{uri}local`)
    #[arg(long, conflicts_with = "container_element")]
    target_element: Option<String>,

    /// Extract the children of the first element with this name
    #[arg(long)]
    container_element: Option<String>,

    /// Wrap extracted content in the document's root element
    #[arg(long)]
    include_root: bool,

    /// Extract every matching element, not only the first
    #[arg(long)]
    all_matches: bool,

    /// Drop document events and the root element
    #[arg(long)]
    body_only: bool,

    /// Elide elements without content
    #[arg(long, value_enum)]
    skip_empty: Option<SkipEmpty>,

    /// Indent the output
    #[arg(long)]
    pretty: bool,

    /// Indent string per level (default: tab)
    #[arg(long, requires = "pretty")]
    indent: Option<String>,

    /// Sort attributes and namespace declarations (with --pretty)
    #[arg(long, requires = "pretty")]
    sort_attributes: bool,

    /// Property file (`key=value` lines) for `${key}` substitution
    #[arg(long)]
    properties: Option<String>,

    /// Substitute placeholders in attribute values too
    #[arg(long, requires = "properties")]
    resolve_attributes: bool,

    /// Write character data only
    #[arg(long)]
    text_mode: bool,

    /// Drop comments from the output
    #[arg(long)]
    no_comments: bool,

    /// Write an XML declaration
    #[arg(long)]
    xml_declaration: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum SkipEmpty {
    /// One level, attributes do not count as content
    Single,
    /// One level, attributes count as content
    SingleAttrs,
    /// Nested empty elements are elided as a whole
    Buffered,
}

impl From<SkipEmpty> for EmptyElementPolicy {
    fn from(value: SkipEmpty) -> Self {
        match value {
            SkipEmpty::Single => Self::SingleLevel { attributes_are_content: false },
            SkipEmpty::SingleAttrs => Self::SingleLevel { attributes_are_content: true },
            SkipEmpty::Buffered => Self::Buffered,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Fehler: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let opts = to_options(&cli)?;
    opts.validate().map_err(|e| format!("Ungueltige Optionen: {e}"))?;

    let system_id = (cli.input != "-").then_some(cli.input.as_str());
    let input = open_input(&cli.input)?;
    write_to_output(&cli.output, |writer| {
        run_reader(&opts, input, system_id, writer, None).map_err(|e| e.to_string())
    })
}

fn to_options(cli: &Cli) -> Result<PipelineOptions, String> {
    let mut opts = PipelineOptions::default();
    opts.set_remove_namespaces(cli.remove_namespaces);
    opts.set_remove_namespaced_contents(cli.remove_namespaced_contents);
    opts.set_target_element(cli.target_element.clone());
    opts.set_container_element(cli.container_element.clone());
    opts.set_include_root(cli.include_root);
    opts.set_all_matches(cli.all_matches);
    opts.set_body_only(cli.body_only);
    opts.set_skip_empty(cli.skip_empty.map(EmptyElementPolicy::from));
    if cli.pretty {
        let mut pretty = PrettyPrintOptions::default().with_sort_attributes(cli.sort_attributes);
        if let Some(indent) = &cli.indent {
            pretty = pretty.with_indent(unescape_indent(indent));
        }
        opts.set_pretty(Some(pretty));
    }
    if let Some(path) = &cli.properties {
        let text = std::fs::read_to_string(path).map_err(|e| format!("Lesefehler '{path}': {e}"))?;
        opts.set_properties(Some(parse_properties(&text)?));
        opts = opts.with_placeholder(PlaceholderOptions::default().with_resolve_attributes(cli.resolve_attributes));
    }
    opts.set_writer(
        WriterOptions::default()
            .with_text_mode(cli.text_mode)
            .with_comments(!cli.no_comments)
            .with_xml_declaration(cli.xml_declaration),
    );
    Ok(opts)
}

/// `\t` und `\n` aus der Kommandozeile als echte Zeichen.
fn unescape_indent(indent: &str) -> String {
    indent.replace("\\t", "\t").replace("\\n", "\n")
}

/// `key=value` pro Zeile; Leerzeilen und `#`-Kommentare werden ignoriert.
fn parse_properties(text: &str) -> Result<IndexMap<String, String>, String> {
    let mut properties = IndexMap::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("Property-Datei Zeile {}: '=' fehlt", n + 1))?;
        properties.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(properties)
}

fn open_input(path: &str) -> Result<Box<dyn BufRead>, String> {
    if path == "-" {
        if std::io::stdin().is_terminal() {
            eprintln!("Lese von stdin (Ctrl+D zum Beenden)...");
        }
        Ok(Box::new(std::io::stdin().lock()))
    } else {
        let file = std::fs::File::open(path).map_err(|e| format!("Lesefehler '{path}': {e}"))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Erstellt einen BufWriter fuer stdout oder eine Datei.
fn create_buf_writer(path: &str) -> Result<BufWriter<Box<dyn Write>>, String> {
    if path == "-" {
        Ok(BufWriter::new(Box::new(std::io::stdout())))
    } else {
        let file = std::fs::File::create(path).map_err(|e| format!("Schreibfehler: {e}"))?;
        Ok(BufWriter::new(Box::new(file)))
    }
}

/// Schreibt Output entweder nach stdout ("-") oder atomar in eine Datei (tmp+rename).
fn write_to_output(
    output_path: &str,
    write_fn: impl FnOnce(&mut BufWriter<Box<dyn Write>>) -> Result<(), String>,
) -> Result<(), String> {
    let tmp_path = (output_path != "-").then(|| format!("{output_path}.tmp"));
    let mut writer = create_buf_writer(tmp_path.as_deref().unwrap_or("-"))?;
    let result = write_fn(&mut writer).and_then(|()| writer.flush().map_err(|e| format!("Schreibfehler: {e}")));
    drop(writer);
    match (result, tmp_path) {
        (Ok(()), Some(tmp)) => std::fs::rename(&tmp, output_path).map_err(|e| format!("Rename-Fehler: {e}")),
        (Err(e), Some(tmp)) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
        (result, None) => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_file_format() {
        let props = parse_properties("# comment\n\na = 1\nurl=http://x/?q=2\n").unwrap();
        assert_eq!(props.get("a").map(String::as_str), Some("1"));
        assert_eq!(props.get("url").map(String::as_str), Some("http://x/?q=2"));
        assert!(parse_properties("broken").is_err());
    }

    #[test]
    fn skip_empty_mapping() {
        assert_eq!(EmptyElementPolicy::from(SkipEmpty::Buffered), EmptyElementPolicy::Buffered);
        assert_eq!(
            EmptyElementPolicy::from(SkipEmpty::SingleAttrs),
            EmptyElementPolicy::SingleLevel { attributes_are_content: true }
        );
    }

    #[test]
    fn cli_flags_map_to_options() {
        let cli = Cli::parse_from(["saxpipe", "--container-element", "list", "--pretty", "--indent", "\\t\\t"]);
        let opts = to_options(&cli).unwrap();
        assert_eq!(opts.container_element(), Some("list"));
        assert_eq!(opts.pretty().map(|p| p.indent.as_str()), Some("\t\t"));
        assert!(opts.validate().is_ok());
        assert!(!opts.all_matches());
    }

    #[test]
    fn all_matches_flag() {
        let cli = Cli::parse_from(["saxpipe", "--target-element", "item", "--all-matches"]);
        let opts = to_options(&cli).unwrap();
        assert!(opts.all_matches());
        assert!(opts.validate().is_ok());
    }
}
