//!
//! pgbrowse
//! --------
//! Interactive table browser. Opens one relation in a tab, renders pages as ASCII tables
//! and lets edits, deletions and inserts accumulate locally until they are saved.

use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use pgbrowse::cli::commands::{self, Command, HELP};
use pgbrowse::cli::render_page;
use pgbrowse::config::{BrowseSettings, ConnectionConfig};
use pgbrowse::error::AppResult;
use pgbrowse::remote::{ConnectionId, MemoryStore, PgStore, RemoteStore, SortSpec};
use pgbrowse::session::{BrowseSession, SessionEvent};
use pgbrowse::tabs::{Navigation, TabHost, TabId};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} --dsn <postgres-url> --table <[schema.]table> [--page-size <n>] [--schema <sch>]\n  {program} --demo [--table <table>]\n\nFlags:\n  --dsn, --connect <url>   PostgreSQL connection (or PGBROWSE_DSN / config file)\n  --table <name>           Relation to open (default schema: public)\n  --page-size <n>          Rows per page (default 100, PGBROWSE_PAGE_SIZE)\n  --schema <sch>           Default schema for bare table names\n  --config <path>          JSON settings file (PGBROWSE_CONFIG)\n  --demo                   Browse a built-in in-memory dataset\n  -h, --help               Show this help\n\n{HELP}"
    );
}

struct Args {
    dsn: Option<String>,
    table: Option<String>,
    page_size: Option<u64>,
    schema: Option<String>,
    config: Option<String>,
    demo: bool,
}

fn parse_args(program: &str, mut args: Vec<String>) -> Args {
    let mut out = Args { dsn: None, table: None, page_size: None, schema: None, config: None, demo: false };
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].clone();
        let needs_value = matches!(flag.as_str(), "--dsn" | "--connect" | "--table" | "-t" | "--page-size" | "--schema" | "--config");
        if needs_value && i + 1 >= args.len() {
            eprintln!("{} requires a value", flag);
            print_usage(program);
            std::process::exit(2);
        }
        match flag.as_str() {
            "--dsn" | "--connect" => out.dsn = Some(std::mem::take(&mut args[i + 1])),
            "--table" | "-t" => out.table = Some(std::mem::take(&mut args[i + 1])),
            "--page-size" => match args[i + 1].parse::<u64>() {
                Ok(n) => out.page_size = Some(n),
                Err(_) => { eprintln!("--page-size must be a number"); std::process::exit(2); }
            },
            "--schema" => out.schema = Some(std::mem::take(&mut args[i + 1])),
            "--config" => out.config = Some(std::mem::take(&mut args[i + 1])),
            "--demo" => { out.demo = true; i += 1; continue; }
            "-h" | "--help" => { print_usage(program); std::process::exit(0); }
            unk => {
                // a bare argument names the table
                if out.table.is_none() && !unk.starts_with('-') { out.table = Some(unk.to_string()); i += 1; continue; }
                eprintln!("Unrecognized argument: {}", unk);
                print_usage(program);
                std::process::exit(2);
            }
        }
        i += 2;
    }
    out
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut argv: Vec<String> = env::args().collect();
    let program = argv.remove(0);
    let args = parse_args(&program, argv);

    let mut settings = match &args.config {
        Some(p) => BrowseSettings::from_file(Path::new(p))?.with_env_overrides(|k| env::var(k).ok()),
        None => BrowseSettings::load()?,
    };
    if let Some(n) = args.page_size { settings.page_size = n.clamp(1, pgbrowse::config::MAX_PAGE_SIZE); }
    if let Some(s) = args.schema { settings.default_schema = s; }
    if let Some(d) = args.dsn { settings.dsn = Some(d); }

    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().context("starting runtime")?;

    let mut pg_store: Option<Arc<PgStore>> = None;
    let (store, conn, default_table): (Arc<dyn RemoteStore>, ConnectionId, &str) = if args.demo {
        let mem = MemoryStore::demo();
        let conn = mem.connection();
        let store: Arc<dyn RemoteStore> = Arc::new(mem);
        (store, conn, "users")
    } else {
        let config = match (&settings.connection, &settings.dsn) {
            (Some(c), _) => c.clone(),
            (None, Some(dsn)) => ConnectionConfig::from_dsn("default", dsn)?,
            (None, None) => {
                eprintln!("no connection given; use --dsn, PGBROWSE_DSN, a config file, or --demo");
                print_usage(&program);
                std::process::exit(2);
            }
        };
        let pg = Arc::new(PgStore::new());
        let conn = rt.block_on(pg.connect(&config))?;
        pg_store = Some(pg.clone());
        let store: Arc<dyn RemoteStore> = pg;
        (store, conn, "")
    };

    let table = args.table.unwrap_or_else(|| default_table.to_string());
    if table.is_empty() {
        eprintln!("--table is required");
        std::process::exit(2);
    }
    info!(target: "pgbrowse", "pgbrowse starting: connection={}, table={}, page_size={}", conn, table, settings.page_size);

    let host = TabHost::new(store, settings);
    let mut repl = Repl { host, conn, tabs: Vec::new(), current: 0 };
    let first = rt.block_on(repl.host.open_tab(repl.conn.clone(), &table))?;
    repl.adopt(first);
    let result = repl.run(&rt);
    if let Some(pg) = pg_store {
        pg.disconnect(&repl.conn);
    }
    result
}

struct Repl {
    host: TabHost,
    conn: ConnectionId,
    /// Open tabs in the order they were created
    tabs: Vec<TabId>,
    current: usize,
}

impl Repl {
    fn adopt(&mut self, id: TabId) {
        if let Ok(session) = self.host.session(id) {
            session.subscribe(report_event);
        }
        self.tabs.push(id);
        self.current = self.tabs.len() - 1;
    }

    fn tab(&self) -> Option<TabId> { self.tabs.get(self.current).copied() }

    fn session(&self) -> AppResult<BrowseSession> {
        match self.tab() {
            Some(id) => self.host.session(id),
            None => Err(pgbrowse::error::AppError::not_found("no_tab", "no tab is open; use 'tab new <table>'")),
        }
    }

    fn run(&mut self, rt: &tokio::runtime::Runtime) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        println!("pgbrowse. Type 'help' for commands.");
        if let Ok(s) = self.session() { println!("{}", render_page(&s.snapshot())); }
        loop {
            let prompt = match self.session() {
                Ok(s) if s.pending_count() > 0 => format!("{} ({})> ", s.relation(), s.pending_count()),
                Ok(s) => format!("{}> ", s.relation()),
                Err(_) => "> ".to_string(),
            };
            let line = match rl.readline(&prompt) {
                Ok(l) => l,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            };
            if !line.trim().is_empty() { let _ = rl.add_history_entry(line.as_str()); }
            let cmd = match commands::parse(&line) {
                Ok(c) => c,
                Err(msg) => { eprintln!("error: {}", msg); continue; }
            };
            if cmd == Command::Quit {
                if let Ok(s) = self.session() {
                    if s.pending_count() > 0 { eprintln!("note: {} pending edit(s) discarded", s.pending_count()); }
                }
                break;
            }
            match rt.block_on(self.execute(cmd)) {
                Ok(Some(msg)) => println!("{}", msg),
                Ok(None) => {}
                Err(e) => eprintln!("error: {}", e.banner()),
            }
        }
        Ok(())
    }

    /// Run one command; returns text to print.
    async fn execute(&mut self, cmd: Command) -> AppResult<Option<String>> {
        let redraw = |s: &BrowseSession| Some(render_page(&s.snapshot()));
        match cmd {
            Command::Help => Ok(Some(HELP.to_string())),
            Command::Quit => Ok(None),
            Command::TabNew(rel) => {
                let id = self.host.open_tab(self.conn.clone(), &rel).await?;
                self.adopt(id);
                Ok(redraw(&self.session()?))
            }
            Command::TabList => {
                let current = self.tab();
                let lines: Vec<String> = self
                    .host
                    .tabs()
                    .iter()
                    .map(|t| {
                        let n = self.tabs.iter().position(|x| *x == t.id).unwrap_or(0);
                        let mark = if Some(t.id) == current { "*" } else { " " };
                        format!("{}{} {} (pending {})", mark, n, t.relation, t.pending_count)
                    })
                    .collect();
                Ok(Some(if lines.is_empty() { "no tabs".to_string() } else { lines.join("\n") }))
            }
            Command::TabUse(n) => {
                if n >= self.tabs.len() {
                    return Err(pgbrowse::error::AppError::not_found("no_tab", format!("no tab {}", n)));
                }
                self.current = n;
                Ok(redraw(&self.session()?))
            }
            Command::TabClose => {
                let id = self.tab().ok_or_else(|| pgbrowse::error::AppError::not_found("no_tab", "no tab is open"))?;
                self.host.close_tab(id)?;
                self.tabs.retain(|t| *t != id);
                self.current = self.current.min(self.tabs.len().saturating_sub(1));
                Ok(self.session().ok().and_then(|s| redraw(&s)))
            }
            other => {
                let s = self.session()?;
                let id = self.tab().ok_or_else(|| pgbrowse::error::AppError::not_found("no_tab", "no tab is open"))?;
                self.session_command(id, &s, other).await
            }
        }
    }

    async fn session_command(&self, id: TabId, s: &BrowseSession, cmd: Command) -> AppResult<Option<String>> {
        let redraw = |s: &BrowseSession| Some(render_page(&s.snapshot()));
        match cmd {
            Command::Show => Ok(redraw(s)),
            Command::Status => Ok(Some(pgbrowse::cli::status_line(&s.snapshot()))),
            Command::Page(n) => { self.host.navigate(id, Navigation::Page(n)).await?; Ok(redraw(s)) }
            Command::Next => { self.host.navigate(id, Navigation::NextPage).await?; Ok(redraw(s)) }
            Command::Prev => { self.host.navigate(id, Navigation::PreviousPage).await?; Ok(redraw(s)) }
            Command::Size(n) => { self.host.navigate(id, Navigation::PageSize(n)).await?; Ok(redraw(s)) }
            Command::Sort { column, direction } => {
                self.host.navigate(id, Navigation::Sort(Some(SortSpec { column, direction }))).await?;
                Ok(redraw(s))
            }
            Command::Unsort => { self.host.navigate(id, Navigation::Sort(None)).await?; Ok(redraw(s)) }
            Command::Open(rel) => {
                let relation = pgbrowse::catalog::RelationRef::parse(&rel, &self.host.settings().default_schema);
                self.host.navigate(id, Navigation::Relation(relation)).await?;
                Ok(redraw(s))
            }
            Command::Refresh => { self.host.navigate(id, Navigation::Refresh).await?; Ok(redraw(s)) }
            Command::Edit { row, column, value } => {
                if s.column_choices(&column)?.is_empty() {
                    s.begin_edit(row, &column)?;
                    s.set_edit_buffer(&value)?;
                    if let Err(e) = s.confirm_edit() {
                        s.cancel_edit();
                        return Err(e);
                    }
                } else {
                    s.choose_value(row, &column, &value)?;
                }
                Ok(redraw(s))
            }
            Command::Null { row, column } => { s.set_null(row, &column)?; Ok(redraw(s)) }
            Command::Choices(column) => {
                let choices = s.column_choices(&column)?;
                Ok(Some(if choices.is_empty() { format!("'{}' takes free text", column) } else { choices.join(" | ") }))
            }
            Command::Select(row) => { s.toggle_selection(row)?; Ok(redraw(s)) }
            Command::SelectAll => { s.toggle_select_all()?; Ok(redraw(s)) }
            Command::Delete => {
                let requested = s.selected_count();
                let deleted = s.delete_selected().await?;
                println!("deleted {} of {} row(s)", deleted, requested);
                Ok(redraw(s))
            }
            Command::Save => {
                let n = s.save().await?;
                println!("saved {} row(s)", n);
                Ok(redraw(s))
            }
            Command::Discard => { s.discard_all(); Ok(redraw(s)) }
            Command::Insert => {
                s.begin_insert();
                let cols: Vec<String> = s.schema().columns.iter().map(|c| {
                    let mut d = c.name.clone();
                    if !c.nullable { d.push_str(" (required)"); }
                    if c.has_default() { d.push_str(" (default)"); }
                    d
                }).collect();
                Ok(Some(format!("new row; use 'set <col> <value>' then 'commit'. columns: {}", cols.join(", "))))
            }
            Command::Set { column, value } => { s.set_draft_value(&column, &value)?; Ok(None) }
            Command::Commit => { s.save_new_row().await?; println!("row inserted"); Ok(redraw(s)) }
            Command::Cancel => { s.cancel_insert(); Ok(None) }
            Command::Export { format, path } => match path {
                Some(p) => {
                    let n = s.export_page_to(Path::new(&p), format)?;
                    Ok(Some(format!("wrote {} row(s) to {}", n, p)))
                }
                None => Ok(Some(s.export_page(format)?)),
            },
            Command::ExportAll { format, path } => match path {
                Some(p) => {
                    let n = s.export_relation_to(Path::new(&p), format).await?;
                    Ok(Some(format!("wrote {} row(s) to {}", n, p)))
                }
                None => Ok(Some(s.export_relation(format).await?)),
            },
            Command::Help | Command::Quit | Command::TabNew(_) | Command::TabList | Command::TabUse(_) | Command::TabClose => Ok(None),
        }
    }
}

/// Surface events the command output does not already cover.
fn report_event(event: &SessionEvent) {
    match event {
        SessionEvent::LoadFailed { error } => eprintln!("! load failed: {}", error.banner()),
        SessionEvent::StaleWriteCompleted { op, succeeded } => {
            eprintln!("! {} finished after the view changed ({})", op.name(), if *succeeded { "ok" } else { "failed" })
        }
        SessionEvent::RowsDeleted { requested, deleted } if (*deleted as usize) < *requested => {
            eprintln!("! only {} of {} selected row(s) were deleted", deleted, requested)
        }
        _ => {}
    }
}
