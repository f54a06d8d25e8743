// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use runtime::HttpRuntime;
use std::env;
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use std::time::Duration;
use syncdash_app::{ApplicationState, ProjectId, Store, TableId, UserId};
use syncdash_persist::{
    AuthIdentity, KeyValueStorage, PersistenceLayer, Preferences, SqliteStorage, TabPhase,
};
use syncdash_views::{
    DashboardView, LoadOutcome, ProjectsView, RevisionHistoryView, TablesView, TicketsView,
    UsersView,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const DEFAULT_WATCH_INTERVAL_MS: u64 = 1000;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `syncdash --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let storage_path = config.storage_path()?;
    if options.print_storage_path {
        println!("{}", storage_path.display());
        return Ok(());
    }

    let storage: Rc<dyn KeyValueStorage> =
        Rc::new(SqliteStorage::open(&storage_path).with_context(|| {
            format!(
                "open storage {} -- if this path is wrong, set [storage].path or SYNCDASH_STORAGE_PATH",
                storage_path.display()
            )
        })?);
    let prefs = Preferences::new(Rc::clone(&storage));

    if options.check_only {
        if config.user_id().is_some() || prefs.identity().user_id.is_some() {
            connect(&config, &prefs)?;
        }
        return Ok(());
    }

    let store = Store::new();
    let layer = PersistenceLayer::attach(store.clone(), Rc::clone(&storage));
    log::debug!("attached to {} ({})", storage_path.display(), layer.phase().as_str());

    let mut session = Session {
        config,
        prefs,
        storage,
        store,
        layer,
    };
    session.execute(options.command.unwrap_or(Command::Status))
}

struct Session {
    config: Config,
    prefs: Preferences,
    storage: Rc<dyn KeyValueStorage>,
    store: Store,
    layer: PersistenceLayer,
}

impl Session {
    fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Status => {
                print!(
                    "{}",
                    render_status(
                        &self.store.current_snapshot(),
                        self.layer.phase(),
                        &self.prefs.identity(),
                        self.prefs.sidebar_collapsed(),
                    )
                );
            }
            Command::Projects { pages, filter } => {
                let mut runtime = self.runtime()?;
                let mut view = ProjectsView::new(self.store.clone(), self.config.page_size());
                view.open();
                if let Some(filter) = &filter {
                    view.set_filter(filter);
                }
                for _ in 0..pages {
                    match view.load_next(&mut runtime) {
                        Some(outcome) => check(outcome)?,
                        None => break,
                    }
                }
                for project in view.rows() {
                    println!("{}\t{}\t{}", project.id, project.name, project.permission_level);
                }
                if view.next_start().is_some() {
                    println!("(more available; pass --pages to load further)");
                }
            }
            Command::Tables { project_id } => {
                let mut runtime = self.runtime()?;
                let mut view = TablesView::new(self.store.clone(), self.config.page_size());
                view.select_project(project_id);
                while let Some(outcome) = view.load_next(&mut runtime) {
                    check(outcome)?;
                }
                for table in view.rows() {
                    println!(
                        "{}\t{}\t{} fields",
                        table.id,
                        table.name,
                        table.fields.len()
                    );
                }
            }
            Command::Tickets {
                project_id,
                table_id,
            } => {
                let mut runtime = self.runtime()?;
                let mut view = TicketsView::new(self.store.clone(), self.config.page_size());
                view.select_table(project_id, table_id);
                while let Some(outcome) = view.load_next(&mut runtime) {
                    check(outcome)?;
                }
                let columns = view.columns();
                println!("id\t{}", columns.join("\t"));
                for ticket in view.rows() {
                    let cells: Vec<String> = columns
                        .iter()
                        .map(|column| ticket.field_text(column).unwrap_or_default())
                        .collect();
                    println!("{}\t{}", ticket.id, cells.join("\t"));
                }
            }
            Command::Users => {
                let mut runtime = self.runtime()?;
                let mut view = UsersView::new(self.store.clone());
                check(view.load(&mut runtime))?;
                for user in view.users() {
                    println!(
                        "{}\t{}\t{}",
                        user.id,
                        user.display_name(),
                        user.state.as_deref().unwrap_or("-")
                    );
                }
                println!("{} active", view.active_count());
            }
            Command::Revisions {
                project_id,
                table_id,
            } => {
                let mut runtime = self.runtime()?;
                let mut view = RevisionHistoryView::new();
                view.select(project_id, table_id);
                check(view.load(&mut runtime))?;
                for entry in view.entries() {
                    println!(
                        "{}\t{}\t{}\t{} -> {}",
                        format_time(entry.created_date),
                        entry.issue_id,
                        entry.column_type.as_str(),
                        entry.old_value,
                        entry.new_value
                    );
                }
            }
            Command::Sync => {
                let mut runtime = self.runtime()?;
                let mut dashboard = DashboardView::new(self.store.clone());
                check(dashboard.sync(&mut runtime, OffsetDateTime::now_utc()))?;
                let summary = dashboard.summary();
                println!(
                    "synced: {} projects, {} tables, {} tickets, {} users",
                    summary.stats.projects,
                    summary.stats.tables,
                    summary.stats.tickets,
                    summary.stats.users
                );
            }
            Command::Login { user_id } => {
                self.prefs.save_identity(&AuthIdentity::signed_in(user_id.clone()))?;
                println!("signed in as {user_id}");
            }
            Command::Logout => {
                self.prefs.forget_identity()?;
                self.layer.clear();
                println!("signed out; cached data cleared");
            }
            Command::Sidebar(action) => {
                let collapsed = match action {
                    SidebarAction::Show => self.prefs.sidebar_collapsed(),
                    SidebarAction::Collapse => {
                        self.prefs.set_sidebar_collapsed(true)?;
                        true
                    }
                    SidebarAction::Expand => {
                        self.prefs.set_sidebar_collapsed(false)?;
                        false
                    }
                    SidebarAction::Toggle => self.prefs.toggle_sidebar()?,
                };
                println!("sidebar {}", if collapsed { "collapsed" } else { "expanded" });
            }
            Command::Watch { interval } => self.watch(interval)?,
        }
        Ok(())
    }

    /// Prints a status line whenever another process changes the shared
    /// state. Runs until interrupted.
    fn watch(&mut self, interval: Duration) -> Result<()> {
        let _subscription = self.store.subscribe(|mutation, snapshot| {
            println!(
                "{mutation:?}: {} projects, {} tables, {} tickets, {} users",
                snapshot.stats.projects,
                snapshot.stats.tables,
                snapshot.stats.tickets,
                snapshot.stats.users
            );
        });
        let mut phase = self.layer.phase();
        println!("watching {} (state {})", self.layer.key(), phase.as_str());
        loop {
            thread::sleep(interval);
            let delivered = self.storage.dispatch_external_changes()?;
            if delivered > 0 {
                log::debug!("delivered {delivered} external change(s)");
            }
            if self.layer.phase() != phase {
                phase = self.layer.phase();
                println!("state {}", phase.as_str());
            }
        }
    }

    fn runtime(&self) -> Result<HttpRuntime> {
        connect(&self.config, &self.prefs).map(HttpRuntime::new)
    }
}

fn connect(config: &Config, prefs: &Preferences) -> Result<syncdash_api::Client> {
    let identity = prefs.identity();
    let user_id = config
        .user_id()
        .map(str::to_owned)
        .or_else(|| identity.user_id.as_ref().map(|id| id.as_str().to_owned()))
        .ok_or_else(|| {
            anyhow!("no user id; set [api].user_id in the config or run `syncdash login <userId>`")
        })?;
    let mut client = syncdash_api::Client::new(config.base_url(), &user_id, config.timeout()?)
        .context("invalid [api] config; fix base_url/user_id/timeout values")?;
    client.set_access_token(identity.access_token);
    Ok(client)
}

fn check(outcome: LoadOutcome) -> Result<()> {
    match outcome {
        LoadOutcome::Failed { message } => bail!("{message}"),
        LoadOutcome::Applied(_) | LoadOutcome::Ignored => Ok(()),
    }
}

fn format_time(time: OffsetDateTime) -> String {
    time.format(&Rfc3339).unwrap_or_else(|_| time.to_string())
}

fn render_status(
    state: &ApplicationState,
    phase: TabPhase,
    identity: &AuthIdentity,
    sidebar_collapsed: bool,
) -> String {
    let user = identity
        .user_id
        .as_ref()
        .map_or_else(|| "signed out".to_owned(), |id| format!("signed in as {id}"));
    let last_sync = state
        .last_sync_time
        .map_or_else(|| "never".to_owned(), format_time);
    let mut out = format!(
        "{user}\nstate: {}\nlast sync: {last_sync}\nsidebar: {}\n",
        phase.as_str(),
        if sidebar_collapsed { "collapsed" } else { "expanded" }
    );
    out.push_str(&format!(
        "projects {}  tables {}  tickets {}  users {}  revisions {}\n",
        state.stats.projects,
        state.stats.tables,
        state.stats.tickets,
        state.stats.users,
        state.stats.revisions
    ));
    if !state.stats_are_derived() {
        out.push_str("counts come from the last sync; open the collections to refresh them\n");
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SidebarAction {
    Show,
    Collapse,
    Expand,
    Toggle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Status,
    Projects {
        pages: usize,
        filter: Option<String>,
    },
    Tables {
        project_id: ProjectId,
    },
    Tickets {
        project_id: ProjectId,
        table_id: TableId,
    },
    Users,
    Revisions {
        project_id: Option<ProjectId>,
        table_id: Option<TableId>,
    },
    Sync,
    Login {
        user_id: UserId,
    },
    Logout,
    Sidebar(SidebarAction),
    Watch {
        interval: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_storage_path: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
    command: Option<Command>,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_storage_path: false,
        print_example: false,
        check_only: false,
        show_help: false,
        command: None,
    };

    let args: Vec<String> = args.into_iter().map(|arg| arg.as_ref().to_owned()).collect();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value);
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_storage_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            flag if flag.starts_with('-') => {
                bail!("unknown argument {flag:?}; run with --help to see supported options");
            }
            name => {
                if options.command.is_some() {
                    bail!("unexpected argument {name:?}; only one command may be given");
                }
                let rest: Vec<String> = iter.by_ref().collect();
                options.command = Some(parse_command(name, rest)?);
            }
        }
    }

    Ok(options)
}

fn parse_command(name: &str, args: Vec<String>) -> Result<Command> {
    let mut iter = args.into_iter();
    let command = match name {
        "status" => Command::Status,
        "users" => Command::Users,
        "sync" => Command::Sync,
        "logout" => Command::Logout,
        "projects" => {
            let mut pages = 1;
            let mut filter = None;
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--pages" => pages = parse_count(iter.next(), "--pages")?,
                    "--filter" => {
                        filter = Some(
                            iter.next()
                                .ok_or_else(|| anyhow!("--filter requires a search text"))?,
                        );
                    }
                    other => bail!("unknown projects option {other:?}"),
                }
            }
            return Ok(Command::Projects { pages, filter });
        }
        "tables" => Command::Tables {
            project_id: ProjectId::new(required(iter.next(), "tables <projectId>")?),
        },
        "tickets" => Command::Tickets {
            project_id: ProjectId::new(required(iter.next(), "tickets <projectId> <tableId>")?),
            table_id: TableId::new(required(iter.next(), "tickets <projectId> <tableId>")?),
        },
        "revisions" => {
            let mut project_id = None;
            let mut table_id = None;
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--project" => {
                        project_id = Some(ProjectId::new(required(iter.next(), "--project <id>")?));
                    }
                    "--table" => {
                        table_id = Some(TableId::new(required(iter.next(), "--table <id>")?));
                    }
                    other => bail!("unknown revisions option {other:?}"),
                }
            }
            return Ok(Command::Revisions {
                project_id,
                table_id,
            });
        }
        "login" => Command::Login {
            user_id: UserId::new(required(iter.next(), "login <userId>")?),
        },
        "sidebar" => {
            let action = match iter.next().as_deref() {
                None => SidebarAction::Show,
                Some("collapse") => SidebarAction::Collapse,
                Some("expand") => SidebarAction::Expand,
                Some("toggle") => SidebarAction::Toggle,
                Some(other) => {
                    bail!("unknown sidebar action {other:?}; use collapse, expand, or toggle")
                }
            };
            Command::Sidebar(action)
        }
        "watch" => {
            let mut interval = Duration::from_millis(DEFAULT_WATCH_INTERVAL_MS);
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--interval-ms" => {
                        let millis = parse_count(iter.next(), "--interval-ms")?;
                        interval = Duration::from_millis(millis as u64);
                    }
                    other => bail!("unknown watch option {other:?}"),
                }
            }
            return Ok(Command::Watch { interval });
        }
        unknown => bail!("unknown command {unknown:?}; run with --help to see supported commands"),
    };

    if let Some(extra) = iter.next() {
        bail!("unexpected argument {extra:?} after {name}");
    }
    Ok(command)
}

fn required(value: Option<String>, usage: &str) -> Result<String> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("missing argument; usage: syncdash {usage}"))
}

fn parse_count(value: Option<String>, flag: &str) -> Result<usize> {
    let raw = value.ok_or_else(|| anyhow!("{flag} requires a positive number"))?;
    match raw.parse::<usize>() {
        Ok(count) if count > 0 => Ok(count),
        _ => bail!("{flag} requires a positive number, got {raw:?}"),
    }
}

fn print_help() {
    println!("syncdash");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved storage path");
    println!("  --print-example-config   Print a config template");
    println!("  --check                  Validate config, storage and API settings");
    println!("  --help                   Show this help");
    println!();
    println!("commands:");
    println!("  status                           Cached counts, sync time and sign-in state");
    println!("  projects [--pages N] [--filter TEXT]");
    println!("  tables <projectId>");
    println!("  tickets <projectId> <tableId>");
    println!("  users");
    println!("  revisions [--project ID] [--table ID]");
    println!("  sync                             Full server sync, then reload projects");
    println!("  login <userId>");
    println!("  logout                           Forget the user and clear cached data");
    println!("  sidebar [collapse|expand|toggle]");
    println!("  watch [--interval-ms N]          Follow changes made by other processes");
}
