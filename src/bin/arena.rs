//! Arena CLI: run relayed bot-vs-bot Azul matches from the command line.
//!
//! Usage:
//!   cargo run --release --bin arena -- --games 200 --p1-type greedy --p2-type random
//!   cargo run --release --bin arena -- --games 50 --p1-eval cautious --p2-eval default

use std::collections::HashMap;

use clap::Parser;

use azul_game_engine::engine::arena::run_arena;
use azul_game_engine::engine::bot_strategy::{BotStrategy, GreedyStrategy, RandomStrategy};
use azul_game_engine::engine::evaluator::{default_eval_fn, EvalFn};
use azul_game_engine::games::azul::evaluator::{azul_eval, make_azul_eval, CAUTIOUS_WEIGHTS};
use azul_game_engine::games::azul::plugin::AzulPlugin;
use azul_game_engine::games::azul::types::GameState;

#[derive(Parser)]
#[command(name = "arena", about = "Run relayed bot-vs-bot arena experiments for Azul")]
struct Cli {
    /// Number of games to play
    #[arg(long, default_value = "100")]
    games: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Alternate seat positions between games
    #[arg(long, default_value = "true")]
    alternate_seats: bool,

    /// P1 display name
    #[arg(long, default_value = "p1")]
    p1_name: String,

    /// P1 strategy type: "greedy" or "random"
    #[arg(long, default_value = "greedy")]
    p1_type: String,

    /// P1 eval profile: "default", "cautious" or "score"
    #[arg(long, default_value = "default")]
    p1_eval: String,

    /// P2 display name
    #[arg(long, default_value = "p2")]
    p2_name: String,

    /// P2 strategy type: "greedy" or "random"
    #[arg(long, default_value = "random")]
    p2_type: String,

    /// P2 eval profile
    #[arg(long, default_value = "default")]
    p2_eval: String,
}

fn resolve_eval(eval_profile: &str) -> EvalFn<GameState> {
    match eval_profile {
        "cautious" => make_azul_eval(&CAUTIOUS_WEIGHTS),
        "score" => Box::new(|state: &GameState, player| default_eval_fn(&AzulPlugin, state, player)),
        "default" => Box::new(azul_eval),
        other => {
            eprintln!("Warning: unknown eval profile '{}', using default", other);
            Box::new(azul_eval)
        }
    }
}

fn build_strategy(strategy_type: &str, eval_profile: &str) -> Box<dyn BotStrategy<AzulPlugin>> {
    match strategy_type {
        "random" => Box::new(RandomStrategy),
        "greedy" => Box::new(GreedyStrategy::<AzulPlugin>::new(resolve_eval(eval_profile))),
        other => {
            eprintln!("Error: unknown strategy type '{}' (expected greedy or random)", other);
            std::process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if cli.p1_name == cli.p2_name {
        eprintln!("Error: players need distinct names");
        std::process::exit(1);
    }

    eprintln!(
        "Arena: {} games, seed={}, alternate_seats={}",
        cli.games, cli.seed, cli.alternate_seats
    );
    eprintln!("  {}: type={}, eval={}", cli.p1_name, cli.p1_type, cli.p1_eval);
    eprintln!("  {}: type={}, eval={}", cli.p2_name, cli.p2_type, cli.p2_eval);
    eprintln!();

    let mut strategies: HashMap<String, Box<dyn BotStrategy<AzulPlugin>>> = HashMap::new();
    strategies.insert(cli.p1_name.clone(), build_strategy(&cli.p1_type, &cli.p1_eval));
    strategies.insert(cli.p2_name.clone(), build_strategy(&cli.p2_type, &cli.p2_eval));

    let total = cli.games;
    let progress_cb = move |done: usize, _total: usize| {
        eprint!("\r  [{}/{}] games completed", done, total);
    };

    let result = run_arena(
        &AzulPlugin,
        &strategies,
        cli.games,
        cli.seed,
        cli.alternate_seats,
        Some(&progress_cb),
    );

    eprintln!("\r                                    "); // clear progress line
    println!("{}", result.summary());
}
