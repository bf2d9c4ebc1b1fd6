use clap::{Parser, Subcommand};

use quicktask::{ListTasksParams, NewTask, QuickTask, TaskUpdate};

#[derive(Parser)]
#[command(name = "quicktask", about = "Personal task manager with dashboard and productivity stats")]
struct Cli {
    /// Database path (default: ~/.quicktask/quicktask.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and sign in
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami {
        #[arg(long)]
        json: bool,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Show dashboard counts for the signed-in user
    Dashboard {
        #[arg(long)]
        json: bool,
    },
    /// Show task statistics for a user
    Stats {
        /// User ID (default: signed-in user)
        user_id: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show daily created/completed counts
    Productivity {
        /// User ID (default: signed-in user)
        user_id: Option<String>,
        /// Window length in days, clamped to 1-365
        #[arg(long, allow_hyphen_values = true)]
        days: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show database status
    Status,
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create a task
    Add {
        title: String,
        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: String,
        #[arg(long)]
        description: Option<String>,
        /// Low, Medium or High
        #[arg(long)]
        priority: Option<String>,
        /// Todo, "In Progress" or Completed
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List tasks
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        /// Case-insensitive title substring
        #[arg(long)]
        search: Option<String>,
        /// createdAt, dueDate or priority
        #[arg(long)]
        sort_by: Option<String>,
        /// asc or desc
        #[arg(long)]
        order: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show one task
    Show {
        task_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Change fields of a task
    Update {
        task_id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Delete a task
    Delete { task_id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => quicktask::Database::open_at(path).await?,
        None => quicktask::Database::open().await?,
    };
    let app = QuickTask::open(db).await?;

    match cli.command {
        Commands::Register {
            name,
            email,
            password,
        } => {
            let request = quicktask::RegisterRequest {
                name: Some(name),
                email: Some(email),
                password: Some(password),
            };
            let auth = app.register(&request).await?;
            println!("Registered and signed in as {} ({})", auth.user.name, auth.user.id);
        }
        Commands::Login { email, password } => {
            let request = quicktask::LoginRequest {
                email: Some(email),
                password: Some(password),
            };
            let auth = app.login(&request).await?;
            println!("Signed in as {} ({})", auth.user.name, auth.user.id);
        }
        Commands::Logout => {
            if app.logout().await? {
                println!("Signed out.");
            } else {
                println!("No active session.");
            }
        }
        Commands::Whoami { json } => {
            let user = app.whoami().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&user)?);
            } else {
                println!("{} <{}>", user.name, user.email);
                println!("  ID: {}", user.id);
            }
        }
        Commands::Task { action } => {
            handle_task(&app, action).await?;
        }
        Commands::Dashboard { json } => {
            let stats = app.dashboard().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
        }
        Commands::Stats { user_id, json } => {
            let stats = app.user_stats(user_id.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Stats: {} ({})", stats.user_name, stats.user_id);
                print_stats(&stats.stats);
            }
        }
        Commands::Productivity {
            user_id,
            days,
            json,
        } => {
            let report = app.productivity(user_id.as_deref(), days).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_productivity(&report);
            }
        }
        Commands::Config { action } => {
            handle_config(&app, action).await?;
        }
        Commands::Status => {
            let status = app.status().await?;
            println!("QuickTask Status");
            println!("  Users: {}", status.users);
            println!("  Tasks: {}", status.tasks);
            match status.signed_in_as {
                Some(email) => println!("  Session: {email}"),
                None => println!("  Session: none"),
            }
        }
    }

    Ok(())
}

async fn handle_task(app: &QuickTask, action: TaskAction) -> anyhow::Result<()> {
    match action {
        TaskAction::Add {
            title,
            due,
            description,
            priority,
            status,
            json,
        } => {
            let input = NewTask {
                title: Some(title),
                description,
                priority,
                status,
                due_date: Some(due),
            };
            let task = app.add_task(&input).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                println!("Created task {}", task.id);
            }
        }
        TaskAction::List {
            status,
            priority,
            search,
            sort_by,
            order,
            json,
        } => {
            let params = ListTasksParams {
                status,
                priority,
                search,
                sort_by,
                order,
            };
            let tasks = app.list_tasks(&params).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("No tasks found.");
            } else {
                for task in &tasks {
                    println!(
                        "[{}] {} ({}) - {} | due: {}",
                        task.status,
                        task.title,
                        task.id,
                        task.priority,
                        task.due_date.format("%Y-%m-%d")
                    );
                }
                println!("\n{} tasks", tasks.len());
            }
        }
        TaskAction::Show { task_id, json } => {
            let task = app.show_task(&task_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                print_task(&task);
            }
        }
        TaskAction::Update {
            task_id,
            title,
            description,
            priority,
            status,
            due,
            json,
        } => {
            let update = TaskUpdate {
                title,
                description,
                priority,
                status,
                due_date: due,
            };
            let task = app.update_task(&task_id, &update).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                print_task(&task);
            }
        }
        TaskAction::Delete { task_id } => {
            app.delete_task(&task_id).await?;
            println!("Deleted task {task_id}");
        }
    }
    Ok(())
}

async fn handle_config(app: &QuickTask, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match app.config_get(&key).await? {
            Some(value) => println!("{value}"),
            None => println!("(not set)"),
        },
        ConfigAction::Set { key, value } => {
            app.config_set(&key, &value).await?;
            println!("Set {key} = {value}");
        }
        ConfigAction::List => {
            let entries = app.config_list().await?;
            if entries.is_empty() {
                println!("No config values set.");
            }
            for (key, value) in entries {
                // Secrets stay out of terminal scrollback.
                if key == "token_secret" || key == quicktask::SESSION_TOKEN_KEY {
                    println!("{key} = <hidden>");
                } else {
                    println!("{key} = {value}");
                }
            }
        }
    }
    Ok(())
}

fn print_task(task: &quicktask::Task) {
    println!("{} ({})", task.title, task.id);
    println!("  Status:   {}", task.status);
    println!("  Priority: {}", task.priority);
    println!("  Due:      {}", task.due_date.format("%Y-%m-%d %H:%M UTC"));
    if let Some(ref description) = task.description {
        println!("  Notes:    {description}");
    }
    println!("  Created:  {}", task.created_at.format("%Y-%m-%d %H:%M UTC"));
    println!("  Updated:  {}", task.updated_at.format("%Y-%m-%d %H:%M UTC"));
}

fn print_stats(stats: &quicktask::DashboardStats) {
    println!("  Total:       {}", stats.total);
    println!("  Completed:   {} ({}%)", stats.completed, stats.completion_rate);
    println!("  In progress: {}", stats.in_progress);
    println!("  Todo:        {}", stats.todo);
    println!("  Overdue:     {}", stats.overdue);
    println!(
        "  Priority:    High {} / Medium {} / Low {}",
        stats.by_priority.high, stats.by_priority.medium, stats.by_priority.low
    );
}

fn print_productivity(report: &quicktask::ProductivityReport) {
    println!(
        "Productivity: {} .. {} ({} days)",
        report.start_date, report.end_date, report.period_days
    );
    println!("  Created:   {}", report.total_created);
    println!("  Completed: {}", report.total_completed);
    println!("  Avg/day:   {:.2}", report.average_daily_completions);
    println!();
    for day in &report.daily_data {
        println!("  {}  +{:<3} done {}", day.date, day.created, day.completed);
    }
}
