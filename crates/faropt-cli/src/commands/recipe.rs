use clap::{Args, Subcommand};
use faropt_core::{CancellationToken, FarOpt, JobId, RecipeId};

use super::job::{ListArgs, backend_kind, follow_up};
use crate::{print_info, print_success};

#[derive(Subcommand, Debug)]
pub enum RecipeCommand {
    /// Save the archive of a submitted job as a reusable recipe.
    Add(AddArgs),
    /// Submit a new job from a recipe without uploading anything.
    Run(RunArgs),
    /// List saved recipes.
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub job_id: JobId,
    #[arg(long)]
    pub description: String,
    #[arg(long)]
    pub maintainer: String,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    pub recipe_id: RecipeId,
    #[arg(long)]
    pub micro: bool,
    #[arg(long)]
    pub wait: bool,
    #[arg(long)]
    pub follow: bool,
}

pub(crate) fn handle_command(
    command: RecipeCommand,
    faropt: &FarOpt,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    match command {
        RecipeCommand::Add(args) => {
            let job = faropt.attach_registered(&args.job_id)?;
            let recipe_id = job.add_recipe(args.description, args.maintainer)?;
            print_success!("Added recipe {recipe_id} from job {}", args.job_id);
        }
        RecipeCommand::Run(args) => {
            let mut job = faropt.job();
            let job_id = job.run_recipe(&args.recipe_id, backend_kind(args.micro))?;
            print_success!("Submitted job {job_id} from recipe {}", args.recipe_id);
            follow_up(faropt, &job, args.wait, args.follow, token)?;
        }
        RecipeCommand::List(args) => {
            let recipes = faropt.list_recipes(args.limit)?;
            if recipes.is_empty() {
                print_info!("No recipes found");
            }
            for recipe in recipes {
                println!(
                    "{}\t{}\t{}\t{}/{}",
                    recipe.recipeid, recipe.description, recipe.maintainer, recipe.bucket, recipe.path
                );
            }
        }
    }
    Ok(())
}
