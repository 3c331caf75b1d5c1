use crate::admin::{self, Admin, BootstrapOutcome, MemberOverride, UserForm};
use crate::api::{self, ApiState};
use crate::config::{build_config, AppConfig};
use crate::dashboard;
use crate::gate;
use crate::inventory::{ContainerSpec, GroupSpec, InventoryHandle};
use crate::model::{Action, ContainerId, GroupId, Role, User, UserId};
use crate::orchestrator::JobRegistry;
use crate::remote::ApiClient;
use crate::runtime::{DockerRuntime, RuntimeClient};
use crate::text_summary::{build_text_summary, group_report_lines, notice_line};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "container-control",
    version,
    about = "Start, stop and watch Docker containers and ordered container groups"
)]
pub struct Cli {
    /// Inventory file (containers, groups, users)
    #[arg(long, global = true, env = "CONTAINER_CONTROL_DATA")]
    pub data_file: Option<PathBuf>,

    /// Address the API server listens on
    #[arg(long, global = true, env = "CONTAINER_CONTROL_BIND", default_value = "0.0.0.0:5000")]
    pub bind: SocketAddr,

    /// Grace period passed to the runtime when stopping a container
    #[arg(long, global = true, default_value = "10s")]
    pub stop_timeout: humantime::Duration,

    /// Admin account ensured on `serve`
    #[arg(long, global = true, env = "ADMIN_USERNAME", hide_env_values = true)]
    pub admin_username: Option<String>,

    #[arg(long, global = true, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the JSON API server
    Serve,
    /// Show the containers and groups visible to a user
    Dashboard {
        #[command(flatten)]
        login: Login,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Start or stop a container or group as a logged-in user
    Control {
        #[command(flatten)]
        login: Login,
        #[command(subcommand)]
        target: Target,
    },
    /// Manage the inventory (admin only)
    Admin {
        #[command(flatten)]
        login: Login,
        #[command(subcommand)]
        command: AdminCommand,
    },
    /// Talk to a running API server with an API key
    Remote {
        /// Base URL of the server
        #[arg(long, env = "CONTAINER_CONTROL_URL", default_value = "http://127.0.0.1:5000")]
        url: String,
        #[arg(long, env = "CONTAINER_CONTROL_USER")]
        user: String,
        #[arg(long, env = "CONTAINER_CONTROL_API_KEY", hide_env_values = true)]
        api_key: String,
        #[command(subcommand)]
        command: RemoteCommand,
    },
    /// Inspect the resolved configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Args, Clone)]
pub struct Login {
    #[arg(long, env = "CONTAINER_CONTROL_USER")]
    pub user: String,
    #[arg(long, env = "CONTAINER_CONTROL_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Target {
    Container { id: ContainerId, action: Action },
    Group { id: GroupId, action: Action },
}

#[derive(Debug, Args, Clone)]
pub struct ContainerArgs {
    /// Unique internal name
    pub internal_name: String,
    pub display_name: String,
    /// Name the container runtime knows the container by
    pub runtime_identifier: String,
    #[arg(long)]
    pub icon: Option<String>,
}

impl From<ContainerArgs> for ContainerSpec {
    fn from(a: ContainerArgs) -> Self {
        ContainerSpec {
            internal_name: a.internal_name,
            display_name: a.display_name,
            runtime_identifier: a.runtime_identifier,
            icon: a.icon,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct GroupArgs {
    pub name: String,
    #[arg(long)]
    pub icon: Option<String>,
    /// Member container ids, in startup order
    #[arg(long = "member", value_delimiter = ',')]
    pub members: Vec<ContainerId>,
}

impl From<GroupArgs> for GroupSpec {
    fn from(a: GroupArgs) -> Self {
        GroupSpec {
            name: a.name,
            icon: a.icon,
            members: a.members,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct UserArgs {
    pub username: String,
    /// Password for the account (required when adding)
    #[arg(long = "new-password")]
    pub new_password: Option<String>,
    #[arg(long, default_value = "user")]
    pub role: Role,
    /// Granted container ids
    #[arg(long = "grant", value_delimiter = ',')]
    pub grants: Vec<ContainerId>,
}

impl From<UserArgs> for UserForm {
    fn from(a: UserArgs) -> Self {
        UserForm {
            username: a.username,
            password: a.new_password,
            role: a.role,
            grants: a.grants,
        }
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum AdminCommand {
    /// Print the whole inventory as JSON (password hashes and keys omitted)
    List,
    AddContainer(ContainerArgs),
    EditContainer {
        id: ContainerId,
        #[command(flatten)]
        container: ContainerArgs,
    },
    DeleteContainer { id: ContainerId },
    /// Set container order, e.g. `3=0 5=1`; invalid values are ignored
    OrderContainers { entries: Vec<String> },
    AddGroup(GroupArgs),
    EditGroup {
        id: GroupId,
        #[command(flatten)]
        group: GroupArgs,
    },
    DeleteGroup { id: GroupId },
    /// Set group order, e.g. `1=0 2=1`
    OrderGroups { entries: Vec<String> },
    /// Adjust member startup order and delay inside one group
    OrderMembers {
        group_id: GroupId,
        /// CONTAINER_ID=ORDER
        #[arg(long = "order")]
        orders: Vec<String>,
        /// CONTAINER_ID=SECONDS
        #[arg(long = "delay")]
        delays: Vec<String>,
    },
    AddUser(UserArgs),
    EditUser {
        id: UserId,
        #[command(flatten)]
        user: UserArgs,
    },
    DeleteUser { id: UserId },
    /// Issue a new API key for a user and print it
    ApiKey { id: UserId },
}

#[derive(Debug, Subcommand, Clone)]
pub enum RemoteCommand {
    Control { container_id: ContainerId, action: Action },
    Status { container_id: ContainerId },
    ControlGroup {
        group_id: GroupId,
        action: Action,
        /// Submit as a background job and poll until it finishes
        #[arg(long)]
        background: bool,
    },
    GroupStatus { group_id: GroupId },
    Job { job_id: String },
}

#[derive(Debug, Subcommand, Clone)]
pub enum ConfigCommand {
    Show,
}

/// Split `ID=VALUE` entries. Entries without a numeric id are skipped; the
/// value is kept raw so the admin service can ignore what it cannot parse.
fn parse_entries(entries: &[String]) -> HashMap<u64, String> {
    entries
        .iter()
        .filter_map(|e| {
            let (id, value) = e.split_once('=')?;
            Some((id.trim().parse().ok()?, value.to_string()))
        })
        .collect()
}

fn member_overrides(orders: &[String], delays: &[String]) -> HashMap<ContainerId, MemberOverride> {
    let mut out: HashMap<ContainerId, MemberOverride> = HashMap::new();
    for (id, v) in parse_entries(orders) {
        out.entry(id).or_default().startup_order = Some(v);
    }
    for (id, v) in parse_entries(delays) {
        out.entry(id).or_default().delay_seconds = Some(v);
    }
    out
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    match args.command {
        Command::Config {
            command: ConfigCommand::Show,
        } => {
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            Ok(())
        }
        Command::Remote {
            url,
            user,
            api_key,
            command,
        } => run_remote(ApiClient::new(&url, user, api_key)?, command).await,
        Command::Serve => serve(&cfg).await,
        Command::Dashboard { login, json } => {
            let inventory = open_inventory(&cfg).await?;
            let runtime = connect_runtime(&cfg)?;
            let user = session_user(&inventory, &login).await?;
            let view = dashboard::build_view(&user, &inventory, runtime.as_ref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                for line in build_text_summary(&view).lines {
                    println!("{line}");
                }
            }
            Ok(())
        }
        Command::Control { login, target } => {
            let inventory = open_inventory(&cfg).await?;
            let runtime = connect_runtime(&cfg)?;
            let user = session_user(&inventory, &login).await?;
            let lines = match target {
                Target::Container { id, action } => {
                    let notice =
                        dashboard::control_container(&user, &inventory, runtime.as_ref(), id, action)
                            .await?;
                    vec![notice_line(&notice)]
                }
                Target::Group { id, action } => {
                    let report =
                        dashboard::control_group(&user, &inventory, runtime.as_ref(), id, action)
                            .await?;
                    group_report_lines(&report)
                }
            };
            for line in lines {
                println!("{line}");
            }
            Ok(())
        }
        Command::Admin { login, command } => {
            let inventory = open_inventory(&cfg).await?;
            let user = session_user(&inventory, &login).await?;
            run_admin(&inventory, &user, command).await
        }
    }
}

async fn open_inventory(cfg: &AppConfig) -> Result<InventoryHandle> {
    InventoryHandle::open(cfg.data_file.clone())
        .await
        .with_context(|| format!("failed to open inventory {}", cfg.data_file.display()))
}

fn connect_runtime(cfg: &AppConfig) -> Result<Arc<dyn RuntimeClient>> {
    let docker = DockerRuntime::connect(cfg.stop_timeout)?;
    Ok(Arc::new(docker))
}

async fn session_user(inventory: &InventoryHandle, login: &Login) -> Result<User> {
    let inv = inventory.read().await?;
    let user = gate::login(&inv, &login.user, &login.password)?;
    Ok(user.clone())
}

async fn serve(cfg: &AppConfig) -> Result<()> {
    let inventory = open_inventory(cfg).await?;
    match cfg.bootstrap_credentials() {
        Some((username, password)) => {
            let outcome = admin::bootstrap_admin(&inventory, username, password)
                .await
                .context("admin bootstrap failed")?;
            match outcome {
                BootstrapOutcome::Created => tracing::info!(username, "Admin user created"),
                BootstrapOutcome::Updated => tracing::info!(username, "Admin user updated"),
                BootstrapOutcome::Unchanged => tracing::debug!(username, "Admin user up to date"),
            }
        }
        None => tracing::info!("ADMIN_USERNAME/ADMIN_PASSWORD not set, skipping admin bootstrap"),
    }

    let state = ApiState {
        inventory,
        runtime: connect_runtime(cfg)?,
        jobs: JobRegistry::new(),
    };
    api::start(state, cfg.bind).await
}

async fn run_admin(inventory: &InventoryHandle, user: &User, command: AdminCommand) -> Result<()> {
    let admin = Admin::new(inventory, user)?;
    match command {
        AdminCommand::List => {
            let inv = inventory.read().await?;
            let users: Vec<serde_json::Value> = inv
                .users()
                .iter()
                .map(|u| {
                    serde_json::json!({
                        "id": u.id,
                        "username": u.username,
                        "role": u.role,
                        "has_api_key": u.api_key.is_some(),
                        "grants": u.grants,
                    })
                })
                .collect();
            let out = serde_json::json!({
                "containers": inv.containers(),
                "groups": inv.groups(),
                "users": users,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        AdminCommand::AddContainer(c) => {
            let id = admin.create_container(c.into()).await?;
            println!("Container #{id} added.");
        }
        AdminCommand::EditContainer { id, container } => {
            admin.update_container(id, container.into()).await?;
            println!("Container #{id} updated.");
        }
        AdminCommand::DeleteContainer { id } => {
            admin.delete_container(id).await?;
            println!("Container #{id} deleted.");
        }
        AdminCommand::OrderContainers { entries } => {
            admin.reorder_containers(&parse_entries(&entries)).await?;
            println!("Container order updated.");
        }
        AdminCommand::AddGroup(g) => {
            let id = admin.create_group(g.into()).await?;
            println!("Group #{id} created.");
        }
        AdminCommand::EditGroup { id, group } => {
            admin.update_group(id, group.into()).await?;
            println!("Group #{id} updated.");
        }
        AdminCommand::DeleteGroup { id } => {
            admin.delete_group(id).await?;
            println!("Group #{id} deleted.");
        }
        AdminCommand::OrderGroups { entries } => {
            admin.reorder_groups(&parse_entries(&entries)).await?;
            println!("Group order updated.");
        }
        AdminCommand::OrderMembers {
            group_id,
            orders,
            delays,
        } => {
            admin
                .reorder_group_members(group_id, &member_overrides(&orders, &delays))
                .await?;
            println!("Group #{group_id} member order updated.");
        }
        AdminCommand::AddUser(u) => {
            let id = admin.create_user(u.into()).await?;
            println!("User #{id} created.");
        }
        AdminCommand::EditUser { id, user } => {
            admin.update_user(id, user.into()).await?;
            println!("User #{id} updated.");
        }
        AdminCommand::DeleteUser { id } => {
            admin.delete_user(id).await?;
            println!("User #{id} deleted.");
        }
        AdminCommand::ApiKey { id } => {
            let key = admin.issue_api_key(id).await?;
            println!("{key}");
        }
    }
    Ok(())
}

async fn run_remote(client: ApiClient, command: RemoteCommand) -> Result<()> {
    let out = match command {
        RemoteCommand::Control {
            container_id,
            action,
        } => client.control(container_id, action).await?,
        RemoteCommand::Status { container_id } => client.status(container_id).await?,
        RemoteCommand::ControlGroup {
            group_id,
            action,
            background,
        } => {
            if background {
                let accepted = client.control_group(group_id, action, false).await?;
                let job_id = accepted
                    .get("job_id")
                    .and_then(|v| v.as_str())
                    .context("server did not return a job id")?
                    .to_string();
                eprintln!("Submitted job {job_id}");
                client.wait_for_job(&job_id, Duration::from_secs(1)).await?
            } else {
                client.control_group(group_id, action, true).await?
            }
        }
        RemoteCommand::GroupStatus { group_id } => client.group_status(group_id).await?,
        RemoteCommand::Job { job_id } => client.job(&job_id).await?,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
