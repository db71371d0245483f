//! `punch` — thin D-Bus client for the punchd attendance daemon.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[zbus::proxy(
    interface = "org.punchd.Attendance1",
    default_service = "org.punchd.Attendance1",
    default_path = "/org/punchd/Attendance1"
)]
trait Attendance {
    fn register_user(
        &self,
        name: &str,
        employee_id: &str,
        email: &str,
        department: &str,
        embedding: Vec<f64>,
    ) -> zbus::Result<String>;
    fn remove_user(&self, employee_id: &str) -> zbus::Result<String>;
    fn list_users(&self) -> zbus::Result<String>;
    fn today(&self) -> zbus::Result<String>;
    fn last_attendance(&self, employee_id: &str) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "punch", about = "Manage the punchd attendance daemon", version)]
struct Cli {
    /// Connect to the session bus instead of the system bus.
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a new user from an embedding file produced by the
    /// enrollment tool (JSON array of 128 numbers).
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        employee_id: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        department: String,
        /// Path to the embedding JSON file.
        #[arg(long)]
        embedding: std::path::PathBuf,
    },
    /// Delete a user, their attendance history, and their encoding.
    Remove { employee_id: String },
    /// List registered users.
    Users,
    /// Show today's attendance log.
    Today,
    /// Show the last attendance event for one employee.
    Last { employee_id: String },
    /// Show daemon status.
    Status,
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let conn = if cli.session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("connecting to D-Bus (is punchd running?)")?;
    let proxy = AttendanceProxy::new(&conn).await?;

    match cli.command {
        Command::Register {
            name,
            employee_id,
            email,
            department,
            embedding,
        } => {
            let raw = std::fs::read_to_string(&embedding)
                .with_context(|| format!("reading {}", embedding.display()))?;
            let values: Vec<f64> =
                serde_json::from_str(&raw).context("embedding file must be a JSON number array")?;
            let reply = proxy
                .register_user(&name, &employee_id, &email, &department, values)
                .await?;
            print_json(&reply)?;
        }
        Command::Remove { employee_id } => {
            print_json(&proxy.remove_user(&employee_id).await?)?;
        }
        Command::Users => {
            print_json(&proxy.list_users().await?)?;
        }
        Command::Today => {
            print_json(&proxy.today().await?)?;
        }
        Command::Last { employee_id } => {
            print_json(&proxy.last_attendance(&employee_id).await?)?;
        }
        Command::Status => {
            print_json(&proxy.status().await?)?;
        }
    }

    Ok(())
}
