use std::collections::HashMap;

use anyhow::{Context, anyhow};
use tarefas_shared::{Credentials, Registration, TaskCreate, TaskPatch, Visual};
use tracing::{debug, info, instrument, warn};

use crate::auth::confirm_password;
use crate::cli::{CategoryCommand, Command, VisualArgs};
use crate::error::Error;
use crate::render::Renderer;
use crate::session::Session;

/// Runs one command, then prints whatever notifications it raised, even
/// when it failed.
#[instrument(skip(session, renderer, command))]
pub async fn execute(session: &Session, renderer: &Renderer, command: Command) -> anyhow::Result<()> {
    let result = dispatch(session, renderer, command).await;

    let (notifications, events) = session.recorder.drain();
    renderer.print_notifications(&notifications, &events)?;

    result
}

pub async fn dispatch(session: &Session, renderer: &Renderer, command: Command) -> anyhow::Result<()> {
    if command.requires_login() && !session.auth.is_authenticated() {
        return Err(Error::Unauthenticated).context("run `tarefas login <username> <password>` first");
    }
    debug!(?command, "dispatching command");

    match command {
        Command::Login { username, password } => cmd_login(session, renderer, username, password).await,
        Command::Register {
            username,
            password,
            name,
            confirm,
        } => cmd_register(session, renderer, username, password, name, confirm).await,
        Command::Logout => {
            session.auth.logout().await;
            println!("Logged out.");
            Ok(())
        }
        Command::Whoami => cmd_whoami(session, renderer).await,
        Command::Categories => {
            let categories = session.categories.all().await?;
            renderer.print_categories(&categories, session.visuals())
        }
        Command::Category(sub) => cmd_category(session, sub).await,
        Command::List { category } => cmd_list(session, renderer, category.as_deref()).await,
        Command::Add { category, content } => cmd_add(session, renderer, category, content.join(" ")).await,
        Command::Edit {
            id,
            content,
            category,
            completed,
        } => {
            let patch = TaskPatch {
                content,
                completed,
                category_id: category,
            };
            let task = session.tasks.update(&id, patch).await?;
            renderer.print_task(&task)
        }
        Command::Toggle { id } => cmd_toggle(session, renderer, &id).await,
        Command::Delete { ids } => cmd_delete(session, &ids).await,
        Command::Visual { category, visual } => cmd_visual(session, renderer, &category, visual),
    }
}

async fn cmd_login(session: &Session, renderer: &Renderer, username: String, password: String) -> anyhow::Result<()> {
    let user = session
        .auth
        .login(&Credentials { username, password })
        .await
        .context("login failed")?;
    println!("Logged in.");
    renderer.print_user(&user)
}

async fn cmd_register(
    session: &Session,
    renderer: &Renderer,
    username: String,
    password: String,
    name: String,
    confirm: Option<String>,
) -> anyhow::Result<()> {
    if let Some(confirmation) = confirm.as_deref() {
        confirm_password(&password, confirmation)?;
    }
    let user = session
        .auth
        .register(&Registration {
            username,
            password,
            name,
        })
        .await
        .context("registration failed")?;
    println!("Account created.");
    renderer.print_user(&user)
}

async fn cmd_whoami(session: &Session, renderer: &Renderer) -> anyhow::Result<()> {
    match session.auth.fetch_current_user().await? {
        Some(user) => renderer.print_user(&user),
        None => Err(anyhow!(Error::Unauthenticated)),
    }
}

async fn cmd_category(session: &Session, sub: CategoryCommand) -> anyhow::Result<()> {
    match sub {
        CategoryCommand::Add { name, visual } => {
            let visual = match (visual.color, visual.icon) {
                (Some(color), Some(icon)) => Some(Visual { color, icon }),
                (None, None) => None,
                _ => return Err(anyhow!("--color and --icon must be given together")),
            };
            let category = session.categories.add(&name, visual).await?;
            println!("Created category {} ({}).", category.name, category.id);
        }
        CategoryCommand::Rename { id, name } => {
            let category = session.categories.update(&id, &name).await?;
            println!("Renamed category {} to {}.", category.id, category.name);
        }
        CategoryCommand::Delete { id } => {
            if session.categories.delete(&id).await? {
                println!("Deleted category {id}.");
            } else {
                warn!(id = %id, "category was not cached locally");
                println!("Deleted category {id} (it was not in the local view).");
            }
        }
    }
    Ok(())
}

async fn cmd_list(session: &Session, renderer: &Renderer, category: Option<&str>) -> anyhow::Result<()> {
    let tasks = match category {
        Some(id) => session.tasks.get_by_category(id).await?,
        None => session.tasks.get_all().await?,
    };
    let names: HashMap<String, String> = session
        .categories
        .all()
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    info!(count = tasks.len(), "listing tasks");
    renderer.print_task_table(&tasks, &names)
}

async fn cmd_add(session: &Session, renderer: &Renderer, category_id: String, content: String) -> anyhow::Result<()> {
    let task = session
        .tasks
        .add(TaskCreate {
            content,
            category_id,
            completed: false,
        })
        .await?;
    renderer.print_task(&task)
}

/// A `NotFound` means the local view is stale; refetch once and retry.
async fn cmd_toggle(session: &Session, renderer: &Renderer, id: &str) -> anyhow::Result<()> {
    let task = match session.tasks.toggle_completed(id).await {
        Err(err) if err.is_not_found() => {
            debug!(id, "task missing from cache; refetching before retry");
            session.categories.invalidate();
            session.categories.fetch_all_with_tasks().await?;
            session.tasks.toggle_completed(id).await?
        }
        other => other?,
    };
    renderer.print_task(&task)
}

async fn cmd_delete(session: &Session, ids: &[String]) -> anyhow::Result<()> {
    session.tasks.delete_many(ids).await?;
    println!("Deleted {} task(s).", ids.len());
    Ok(())
}

fn cmd_visual(session: &Session, renderer: &Renderer, category_id: &str, args: VisualArgs) -> anyhow::Result<()> {
    let visuals = session.visuals();
    let visual = if args.color.is_none() && args.icon.is_none() {
        visuals.get(category_id)
    } else {
        let current = visuals.get(category_id);
        let color = args.color.unwrap_or(current.color);
        let icon = args.icon.unwrap_or(current.icon);
        visuals
            .set(category_id, &color, &icon)
            .with_context(|| format!("failed to set visual for {category_id}"))?
    };
    renderer.print_visual(category_id, &visual)
}
