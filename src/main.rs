//! Fragment Composer CLI
//!
//! Usage:
//!   fragment-composer [OPTIONS] [FILE]
//!
//! Options:
//!   -p, --params <FILE>      Parameter set (TOML format)
//!   -f, --fragments <DIR>    Directory of shared fragments for includes
//!   --page <FILE>            Compose a page manifest (TOML format)
//!   --check                  Report lint warnings instead of rendering
//!   --syntax                 Show fragment syntax reference
//!   -h, --help               Print help

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fragment_composer::{
    ComposeConfig, ComposeError, Composer, FragmentRegistry, LintWarning, Page, ParameterSet,
    Value,
};

#[derive(Parser)]
#[command(name = "fragment-composer")]
#[command(about = "Render parameterised HTML fragments into documentation pages")]
struct Cli {
    /// Fragment file (reads from stdin if not provided)
    input: Option<PathBuf>,

    /// Parameter set file (TOML format)
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Set a string parameter (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Set a boolean parameter to true (repeatable)
    #[arg(long, value_name = "NAME")]
    enable: Vec<String>,

    /// Set a boolean parameter to false (repeatable)
    #[arg(long, value_name = "NAME")]
    disable: Vec<String>,

    /// Directory of shared fragments available to includes
    #[arg(short, long, value_name = "DIR")]
    fragments: Option<PathBuf>,

    /// Compose a page manifest instead of a single fragment
    #[arg(long, value_name = "FILE")]
    page: Option<PathBuf>,

    /// HTML-escape substituted parameter values
    #[arg(long)]
    escape_html: bool,

    /// Report lint warnings instead of rendering
    #[arg(long)]
    check: bool,

    /// Show fragment syntax reference
    #[arg(long)]
    syntax: bool,

    /// Log pipeline details to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.syntax {
        print_syntax();
        return;
    }

    // If no input and stdin is a terminal (interactive), show intro help
    if cli.input.is_none() && cli.page.is_none() && io::stdin().is_terminal() {
        print_intro();
        return;
    }

    let params = match build_params(&cli) {
        Ok(params) => params,
        Err(message) => fail(&message),
    };

    let mut registry = FragmentRegistry::new();
    if let Some(dir) = &cli.fragments {
        if let Err(e) = registry.load_dir(dir) {
            fail(&format!("Error loading fragments from '{}': {}", dir.display(), e));
        }
    }

    let config = ComposeConfig::new().with_escape_html(cli.escape_html);
    let composer = Composer::new().with_registry(registry).with_config(config);

    if let Some(path) = &cli.page {
        let mut page = match Page::from_file(path) {
            Ok(page) => page,
            Err(e) => fail(&format!("Error loading page '{}': {}", path.display(), e)),
        };
        // Command-line parameters win over the manifest's page-wide values
        page.params = page.params.merged(&params);
        if cli.check {
            run_page_check(&page, &path.display().to_string(), &composer);
            return;
        }
        match composer.compose_page(&page) {
            Ok(html) => print!("{}", html),
            Err(e) => fail(&format!("Error: {}", composer.format_error(&e, "", ""))),
        }
        return;
    }

    let filename = cli
        .input
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<stdin>".to_string());

    let source = match &cli.input {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => fail(&format!("Error reading file '{}': {}", path.display(), e)),
        },
        None => {
            let mut buffer = String::new();
            match io::stdin().read_to_string(&mut buffer) {
                Ok(_) => buffer,
                Err(e) => fail(&format!("Error reading from stdin: {}", e)),
            }
        }
    };

    if cli.check {
        run_check(&source, &filename, &params, &composer);
        return;
    }

    match composer.compose(&source, &params) {
        Ok(html) => print!("{}", html),
        Err(e) => fail(&composer.format_error(&e, &source, &filename)),
    }
}

/// Install the stderr subscriber; `RUST_LOG` takes precedence over `--verbose`
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Collect parameters from the params file and the command-line flags, in that order
fn build_params(cli: &Cli) -> Result<ParameterSet, String> {
    let mut params = match &cli.params {
        Some(path) => ParameterSet::from_file(path)
            .map_err(|e| format!("Error loading parameters '{}': {}", path.display(), e))?,
        None => ParameterSet::new(),
    };

    for assignment in &cli.set {
        let (name, value) =
            ParameterSet::parse_assignment(assignment).map_err(|e| format!("Error: {}", e))?;
        params.insert(name, value);
    }
    for name in &cli.enable {
        params.insert(name.clone(), Value::Bool(true));
    }
    for name in &cli.disable {
        params.insert(name.clone(), Value::Bool(false));
    }
    Ok(params)
}

fn run_check(source: &str, filename: &str, params: &ParameterSet, composer: &Composer) {
    // Without a fragment directory includes stay unresolved and are reported as such
    let warnings = match composer.check(source, params) {
        Ok(warnings) => warnings,
        Err(ComposeError::Malformed(errors)) => {
            for e in &errors {
                eprintln!("{}", e.format(source, filename));
            }
            std::process::exit(1);
        }
        Err(e) => fail(&format!("Error: {}", e)),
    };

    for w in &warnings {
        eprintln!("{}", describe_warning(w, source, filename, composer));
    }
    finish_check(warnings.iter(), warnings.len());
}

fn run_page_check(page: &Page, filename: &str, composer: &Composer) {
    let warnings = match composer.check_page(page) {
        Ok(warnings) => warnings,
        Err(e) => fail(&format!("Error: {}", e)),
    };

    for found in &warnings {
        // Inline parts have no file of their own
        let line = describe_warning(&found.warning, "", filename, composer);
        match found.part {
            Some(index) => eprintln!("part {}: {}", index, line),
            None => eprintln!("{}", line),
        }
    }
    finish_check(warnings.iter().map(|w| &w.warning), warnings.len());
}

/// `file:line: [category] message`, with the file and line of the fragment
/// the warning points into
fn describe_warning(
    warning: &LintWarning,
    source: &str,
    filename: &str,
    composer: &Composer,
) -> String {
    let (text, name) = composer.warning_source(warning, source, filename);
    match &warning.span {
        Some(span) if !text.is_empty() => format!(
            "{}:{}: [{}] {}",
            name,
            line_of(text, span.start),
            warning.category,
            warning.message
        ),
        _ => format!("{}: [{}] {}", name, warning.category, warning.message),
    }
}

fn finish_check<'a>(warnings: impl Iterator<Item = &'a LintWarning>, total: usize) {
    let errors = warnings.filter(|w| w.category.is_error()).count();
    if errors > 0 {
        tracing::warn!(errors, total, "fragment check failed");
        std::process::exit(1);
    }
    tracing::info!(total, "fragment check passed");
}

/// 1-based line number of a byte offset
fn line_of(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}

fn print_intro() {
    println!(
        r#"Fragment Composer - parameterised HTML fragments for documentation pages

USAGE:
    fragment-composer [OPTIONS] [FILE]
    echo '<fragment>' | fragment-composer --set name=value

OPTIONS:
    -p, --params <FILE>     Parameter set (TOML file)
    --set KEY=VALUE         String parameter (repeatable)
    --enable NAME           Boolean parameter set to true (repeatable)
    --disable NAME          Boolean parameter set to false (repeatable)
    -f, --fragments <DIR>   Shared fragments for includes
    --page <FILE>           Compose a page manifest (TOML file)
    --escape-html           HTML-escape substituted values
    --check                 Report lint warnings instead of rendering
    --syntax                Show fragment syntax reference
    -v, --verbose           Log pipeline details to stderr
    -h, --help              Print help

QUICK START:
    echo '<h2>{{{{brokerage_name}}}}</h2>' | fragment-composer --set brokerage_name=Kraken

Run --syntax for the fragment syntax reference."#
    );
}

fn print_syntax() {
    println!(
        r#"FRAGMENT SYNTAX
===============

TEXT
----
Anything outside {{{{ ... }}}} is copied verbatim. A lone '{{' is literal.

PLACEHOLDERS
------------
{{{{name}}}}                  Replaced by string parameter 'name'
{{{{name | "fallback"}}}}     'fallback' when 'name' is not supplied

A quoted string may contain braces, as in {{{{name | "a}}b"}}}}, and
backslash-escaped quotes. Outside quotes a tag may not contain '{{' or '}}'.

CONDITIONALS
------------
{{{{#if flag}}}} ... {{{{/if}}}}
{{{{#if flag}}}} ... {{{{else}}}} ... {{{{/if}}}}
{{{{#unless flag}}}} ... {{{{/unless}}}}

Truthiness: booleans are their value; strings and lists are true when
non-empty.

LISTS
-----
{{{{#each items}}}} ... {{{{/each}}}}
{{{{#each items}}}} ... {{{{else}}}} shown when empty {{{{/each}}}}

Inside the body:
    {{{{this}}}}       Current item
    {{{{@index}}}}     Zero-based position
    @first, @last  Booleans, usable in #if

INCLUDES
--------
{{{{> settlements}}}}                        Registered fragment
{{{{> "brokerages/deploy" key="value"}}}}    Path name with literal bindings

Included fragments see the caller's parameters; bindings win.

COMMENTS
--------
{{{{! not rendered }}}}

A comment ends at its first '}}', so it cannot contain braces.

NAMES
-----
Letters, digits, '_' and '-', not starting with a digit:
    brokerage_name, is-supported, item_1

PARAMETER FILES
---------------
brokerage_name = "Bitfinex"
is_supported = true
markets = ["spot", "margin"]"#
    );
}
