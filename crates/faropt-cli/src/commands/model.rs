use clap::{Args, Subcommand};
use faropt_core::{Bounds, FarOpt, ModelName};

use crate::{print_info, print_success};

#[derive(Subcommand, Debug)]
pub enum ModelCommand {
    /// Create an optimizer over the given bounds.
    Create(CreateArgs),
    /// Print the next point to evaluate.
    Ask(AskArgs),
    /// Record the objective value observed at a point.
    Tell(TellArgs),
    /// List stored models with their tags.
    List,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// One `(low, high)` pair per dimension, e.g. `"[(-2, 2), (0, 5)]"`.
    pub bounds: Bounds,
    #[arg(long)]
    pub tag: Option<String>,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    pub name: ModelName,
}

#[derive(Args, Debug)]
pub struct TellArgs {
    pub name: ModelName,
    /// The evaluated point as a JSON array, e.g. `"[0.5, 1.0]"`.
    pub x: String,
    #[arg(allow_negative_numbers = true)]
    pub f: f64,
}

pub(crate) fn handle_command(command: ModelCommand, faropt: &FarOpt) -> anyhow::Result<()> {
    let models = faropt.models()?;
    match command {
        ModelCommand::Create(args) => {
            let name = models.create_model(args.bounds, args.tag.as_deref())?;
            print_success!("Created model {name}");
        }
        ModelCommand::Ask(args) => {
            let x = models.ask_model(&args.name)?;
            println!("{}", serde_json::to_string(&x)?);
        }
        ModelCommand::Tell(args) => {
            let x: Vec<f64> = serde_json::from_str(&args.x)
                .map_err(|e| anyhow::anyhow!("Invalid point {:?}: {e}", args.x))?;
            let best = models.tell_model(&args.name, x, args.f)?;
            print_success!(
                "Recorded observation, best so far is {} at {}",
                best.f,
                serde_json::to_string(&best.x)?
            );
        }
        ModelCommand::List => {
            let summaries = models.list_models()?;
            if summaries.is_empty() {
                print_info!("No models found");
            }
            for model in summaries {
                println!("{}\t{}", model.name, model.tag);
            }
        }
    }
    Ok(())
}
