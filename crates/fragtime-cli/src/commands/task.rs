use clap::Subcommand;
use fragtime_core::{NewTask, Task};

use crate::context::{print_json, AppContext, CliResult};

#[derive(Subcommand)]
pub enum TaskAction {
    /// List task categories
    Categories {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Tasks that fit a gap of the given length
    Recommend {
        /// Free time in minutes
        minutes: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Active tasks in a category
    List {
        /// Category id
        category: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one task with its steps
    Show { id: String },
    /// Find tasks by title or description
    Search {
        query: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a task of your own to the catalog
    Create {
        title: String,
        /// Length in minutes
        #[arg(long)]
        duration: u32,
        /// Category id
        #[arg(long)]
        category: String,
        #[arg(long, default_value = "")]
        description: String,
        /// A step; repeat for more
        #[arg(long = "step")]
        steps: Vec<String>,
    },
}

fn summary_line(task: &Task) -> String {
    let category = task
        .category
        .as_ref()
        .map(|c| c.name.as_str())
        .or(task.category_id.as_deref())
        .unwrap_or("-");
    format!(
        "{}  {:>3} min  {:<6}  {:<12}  {}",
        task.id,
        task.duration,
        task.difficulty.as_str(),
        category,
        task.title
    )
}

fn print_tasks(tasks: &[Task], json: bool) -> CliResult {
    if json {
        return print_json(&tasks);
    }
    if tasks.is_empty() {
        println!("no tasks found");
    }
    for task in tasks {
        println!("{}", summary_line(task));
    }
    Ok(())
}

pub async fn run(ctx: &AppContext, action: TaskAction) -> CliResult {
    let catalog = ctx.catalog()?;
    match action {
        TaskAction::Categories { json } => {
            let categories = catalog.categories().await?;
            if json {
                return print_json(&categories);
            }
            for category in &categories {
                println!("{}  {}", category.id, category.name);
            }
            Ok(())
        }
        TaskAction::Recommend { minutes, json } => {
            print_tasks(&catalog.recommended(minutes).await?, json)
        }
        TaskAction::List { category, json } => {
            print_tasks(&catalog.by_category(&category).await?, json)
        }
        TaskAction::Show { id } => match catalog.task(&id).await? {
            Some(task) => print_json(&task),
            None => Err(format!("no task with id {id}").into()),
        },
        TaskAction::Search { query, json } => print_tasks(&catalog.search(&query).await?, json),
        TaskAction::Create {
            title,
            duration,
            category,
            description,
            steps,
        } => {
            let task = catalog
                .create_custom(NewTask {
                    title,
                    description,
                    duration,
                    category_id: category,
                    steps,
                })
                .await?;
            print_json(&task)
        }
    }
}
