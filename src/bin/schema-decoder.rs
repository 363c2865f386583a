//! Schema Decoder CLI
//!
//! Command-line interface for decoding request bodies and inspecting schema paths.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use http::header::CONTENT_TYPE;
use http::{Method, Request};
use schema_decoder::{
    is_url, list_paths, load_schema, load_schema_auto, split_reference, Body, DecodeError,
    Decoder, DecoderOptions, ParseErrorStrategy, SchemaCompiler,
    DEFAULT_MAX_CIRCULAR_REFERENCE_DEPTH,
};
use serde_json::{json, Value};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-decoder")]
#[command(about = "Decode HTTP request bodies guided by a JSON Schema")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a request body into JSON
    Decode {
        /// Body file ("-" reads stdin)
        body: String,

        /// Content-Type header of the request
        #[arg(long)]
        content_type: String,

        /// Schema source: file path or URL, optionally with a #/fragment
        #[arg(long)]
        schema: Option<String>,

        /// HTTP method of the request
        #[arg(long, default_value = "POST")]
        method: String,

        /// What to do with values that don't match their declared type
        #[arg(long, default_value = "ignore", value_parser = parse_strategy)]
        strategy: ParseErrorStrategy,

        /// Decode JSON with dotted keys like a form
        #[arg(long)]
        flattened: bool,

        /// Skip schema validation of the decoded payload
        #[arg(long)]
        no_validate: bool,

        /// How often a circular $ref is expanded
        #[arg(long, default_value_t = DEFAULT_MAX_CIRCULAR_REFERENCE_DEPTH)]
        max_depth: u8,

        /// Keep the raw body and include it in --json output
        #[arg(long)]
        keep_body: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// List the form paths a schema accepts
    Paths {
        /// Schema source: file path or URL, optionally with a #/fragment
        schema: String,

        /// How often a circular $ref is expanded
        #[arg(long, default_value_t = DEFAULT_MAX_CIRCULAR_REFERENCE_DEPTH)]
        max_depth: u8,

        /// Output as a JSON array
        #[arg(long)]
        json: bool,
    },
}

fn parse_strategy(s: &str) -> Result<ParseErrorStrategy, String> {
    ParseErrorStrategy::parse(s)
        .ok_or_else(|| format!("unknown strategy \"{}\" (expected ignore, empty or return)", s))
}

struct DecodeArgs {
    body: String,
    content_type: String,
    schema: Option<String>,
    method: String,
    strategy: ParseErrorStrategy,
    flattened: bool,
    no_validate: bool,
    max_depth: u8,
    keep_body: bool,
    pretty: bool,
    output: Option<PathBuf>,
    json_output: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Decode {
            body,
            content_type,
            schema,
            method,
            strategy,
            flattened,
            no_validate,
            max_depth,
            keep_body,
            pretty,
            output,
            json,
        } => run_decode(DecodeArgs {
            body,
            content_type,
            schema,
            method,
            strategy,
            flattened,
            no_validate,
            max_depth,
            keep_body,
            pretty,
            output,
            json_output: json,
        }),

        Commands::Paths {
            schema,
            max_depth,
            json,
        } => run_paths(&schema, max_depth, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_decode(args: DecodeArgs) -> Result<(), u8> {
    let json_output = args.json_output;

    let mut options = DecoderOptions::new()
        .keep_request_body(args.keep_body)
        .parse_error_strategy(args.strategy)
        .max_circular_reference_depth(args.max_depth);
    if args.flattened {
        options = options.json_follows_form_format();
    }
    if let Some(source) = &args.schema {
        let (compiler, reference) = load_registry(source).map_err(|(msg, code)| {
            report_error(json_output, &msg);
            code
        })?;
        options = options.json_schema_compiler(reference, Some(compiler));
    }
    if args.no_validate {
        options = options.validate_payloads(false);
    }

    let mut request = build_request(&args).map_err(|(msg, code)| {
        report_error(json_output, &msg);
        code
    })?;

    let value: Value = match Decoder::new().decode(&mut request, &options) {
        Ok(value) => value,
        Err(e) => {
            report_decode_error(json_output, &e);
            return Err(e.exit_code() as u8);
        }
    };

    let rendered = if json_output {
        let mut result = json!({ "ok": true, "value": value });
        if args.keep_body {
            let mut kept = String::new();
            request.body_mut().read_to_string(&mut kept).map_err(|e| {
                report_error(json_output, &format!("reading kept body: {}", e));
                3u8
            })?;
            result["body"] = Value::String(kept);
        }
        render(&result, args.pretty)
    } else {
        render(&value, args.pretty)
    }?;

    write_output(args.output.as_deref(), &rendered)
}

fn build_request(args: &DecodeArgs) -> Result<Request<Body>, (String, u8)> {
    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .map_err(|e| (format!("invalid method {}: {}", args.method, e), 1))?;

    let body = if args.body == "-" {
        Body::from_reader(io::stdin())
    } else {
        let bytes = std::fs::read(&args.body)
            .map_err(|e| (format!("cannot read body {}: {}", args.body, e), 3))?;
        Body::from(bytes)
    };

    Request::builder()
        .method(method)
        .uri("/")
        .header(CONTENT_TYPE, args.content_type.as_str())
        .body(body)
        .map_err(|e| (format!("invalid request: {}", e), 1))
}

fn run_paths(source: &str, max_depth: u8, json_output: bool) -> Result<(), u8> {
    let (compiler, reference) = load_registry(source).map_err(|(msg, code)| {
        eprintln!("Error: {}", msg);
        code
    })?;

    let paths = list_paths(&reference, &compiler, max_depth).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    if json_output {
        println!("{}", render(&paths, false)?);
    } else {
        for path in &paths {
            println!("{}\t{}", path.name, path.ty);
        }
    }
    Ok(())
}

/// Register the schema at `source` in a fresh compiler.
///
/// Local schemas are registered under their file name, next to every other
/// `.json` file in the same directory, so relative `$ref`s like
/// `"address.json"` resolve. URLs are registered under the URL itself.
fn load_registry(source: &str) -> Result<(Arc<SchemaCompiler>, String), (String, u8)> {
    let (document, fragment) = split_reference(source);
    let compiler = SchemaCompiler::new();

    let id = if is_url(document) {
        let schema =
            load_schema_auto(document).map_err(|e| (e.to_string(), e.exit_code() as u8))?;
        compiler.add_resource(document, schema);
        document.to_string()
    } else {
        let path = Path::new(document);
        let schema = load_schema(path).map_err(|e| (e.to_string(), e.exit_code() as u8))?;
        let id = file_name(path);
        register_siblings(&compiler, path, &id);
        compiler.add_resource(id.clone(), schema);
        id
    };

    let reference = match fragment {
        Some(fragment) => format!("{}{}", id, fragment),
        None => id,
    };
    Ok((Arc::new(compiler), reference))
}

fn register_siblings(compiler: &SchemaCompiler, path: &Path, skip: &str) {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let sibling = entry.path();
        let id = file_name(&sibling);
        if id == skip || sibling.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match load_schema(&sibling) {
            Ok(schema) => compiler.add_resource(id, schema),
            Err(e) => warn!(file = %sibling.display(), error = %e, "skipping schema"),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn render<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String, u8> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })
}

fn write_output(output: Option<&Path>, rendered: &str) -> Result<(), u8> {
    match output {
        Some(path) => std::fs::write(path, rendered).map_err(|e| {
            eprintln!("Error writing to {}: {}", path.display(), e);
            3u8
        }),
        None => {
            println!("{}", rendered);
            Ok(())
        }
    }
}

/// Output a decode failure in plain text or JSON format.
fn report_decode_error(json_output: bool, err: &DecodeError) {
    if json_output {
        let mut output = json!({
            "ok": false,
            "kind": err.kind(),
            "status": err.status_code().as_u16(),
            "error": err.reason(),
        });
        let details = err.details();
        if !details.is_empty() {
            output["details"] = json!(details);
        }
        if let DecodeError::Invalid { errors } = err {
            output["errors"] = json!(errors);
        }
        println!("{}", output);
    } else {
        eprintln!("Error: {}", err.reason());
        if let DecodeError::Invalid { errors } = err {
            for error in errors {
                eprintln!("  {}", error);
            }
        }
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", json!({ "ok": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
