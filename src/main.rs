use std::env;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use filterql::{dsl, CompiledQuery, FieldMap, ModelRegistry, SqlCompiler};

const DEFAULT_REGISTRY_PATH: &str = "models.json";

const HELP: &str = "\
Type a filter such as `ID,content?ID==1*content>>a,b?ID,desc,10,0` to compile it.
Commands:
  :target <name>    switch the request target
  :targets          list known targets
  :count            toggle the row-count query
  :args             toggle placeholders ($N) and bound arguments
  :search [text]    set the search block (`field~~text`), or clear it
  :json             toggle JSON output
  :conditions <f>   list the conditions of a filter
  :help             show this help
  :quit             exit";

/// Shell state between lines.
struct Session {
    registry: ModelRegistry,
    compiler: SqlCompiler,
    target: String,
    fields: FieldMap,
    with_count: bool,
    with_args: bool,
    json: bool,
    search: String,
}

impl Session {
    fn new(registry: ModelRegistry) -> Result<Self> {
        let target = registry
            .targets()
            .next()
            .context("model registry has no targets")?
            .to_string();
        let fields = registry.field_map(&target)?;
        Ok(Self {
            registry,
            compiler: SqlCompiler::new(),
            target,
            fields,
            with_count: false,
            with_args: false,
            json: false,
            search: String::new(),
        })
    }

    fn switch_target(&mut self, target: &str) -> Result<()> {
        self.fields = self.registry.field_map(target)?;
        self.target = target.to_string();
        Ok(())
    }

    fn compile(&self, filter: &str) -> filterql::CompileResult<CompiledQuery> {
        self.compiler.search(
            &self.fields,
            &self.target,
            filter,
            self.with_count,
            self.with_args,
            &self.search,
        )
    }

    fn prompt(&self) -> String {
        format!("{}> ", self.target)
    }

    /// Handles one input line; returns false when the shell should exit.
    fn handle(&mut self, line: &str) -> Result<bool> {
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        match command {
            ":quit" | ":exit" => return Ok(false),
            ":help" => println!("{}", HELP),
            ":targets" => {
                for target in self.registry.targets() {
                    println!("  {}", target);
                }
            }
            ":target" => match self.switch_target(rest) {
                Ok(()) => println!("✓ target: {}", self.target),
                Err(e) => println!("✗ {}", e),
            },
            ":count" => {
                self.with_count = !self.with_count;
                println!("count query: {}", on_off(self.with_count));
            }
            ":args" => {
                self.with_args = !self.with_args;
                println!("placeholders: {}", on_off(self.with_args));
            }
            ":json" => {
                self.json = !self.json;
                println!("json output: {}", on_off(self.json));
            }
            ":search" => {
                self.search = rest.to_string();
                if self.search.is_empty() {
                    println!("search cleared");
                } else {
                    println!("search: {}", self.search);
                }
            }
            ":conditions" => match dsl::conditions_list(&self.fields, rest, false) {
                Ok(conditions) => {
                    for c in conditions {
                        let group = if c.in_group { " (grouped)" } else { "" };
                        println!("  {} {} {}{}", c.field, c.operator, c.value, group);
                    }
                }
                Err(e) => println!("✗ {}", e),
            },
            _ if command.starts_with(':') => println!("unknown command {}, try :help", command),
            _ => match self.compile(line) {
                Ok(query) => self.print(&query)?,
                Err(e) => println!("✗ {}", e),
            },
        }
        Ok(true)
    }

    fn print(&self, query: &CompiledQuery) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(query)?);
            return Ok(());
        }
        println!("{}", query.main_sql);
        if let Some(count) = &query.count_sql {
            println!("{}", count);
        }
        if let Some(args) = &query.args {
            for (i, arg) in args.iter().enumerate() {
                println!("  ${} = {} ({})", i + 1, arg, arg.kind_name());
            }
        }
        Ok(())
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

/// Loads the registry named on the command line, else `models.json`, else the
/// built-in demo model.
fn load_registry() -> Result<ModelRegistry> {
    if let Some(path) = env::args().nth(1) {
        let registry = ModelRegistry::from_json_file(&path)
            .with_context(|| format!("failed to load model registry {}", path))?;
        println!("✅ loaded {} model(s) from {}", registry.len(), path);
        return Ok(registry);
    }
    match ModelRegistry::from_json_file(DEFAULT_REGISTRY_PATH) {
        Ok(registry) => {
            println!("✅ loaded {} model(s) from {}", registry.len(), DEFAULT_REGISTRY_PATH);
            Ok(registry)
        }
        Err(e) => {
            println!("⚠️ {} ({}), using the demo model", e, DEFAULT_REGISTRY_PATH);
            Ok(ModelRegistry::demo())
        }
    }
}

fn run() -> Result<()> {
    println!("--- filterql: filter to SQL compiler ---");
    let mut session = Session::new(load_registry()?)?;
    println!("{}", HELP);

    let mut editor = DefaultEditor::new().context("failed to start line editor")?;
    loop {
        match editor.readline(&session.prompt()) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;
                if !session.handle(line)? {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("failed to read line"),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    run()
}
