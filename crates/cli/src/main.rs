use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use rankpart_cli::config::PlannerConfig;
use rankpart_cli::logging;
use rankpart_core::{
    partition, recompute_after_scale_in, recompute_after_scale_out, select_save_rank, GroupKind,
    LoadRole, Purpose, RankGroup, RankIdentity, ScaleKind, ScaleOutcome, SelectionCache,
    SelectionResult, SyntheticGroups,
};

#[derive(Parser)]
#[command(
    name = "rankpart",
    version,
    about = "Replica partitioning and writer-rank selection for data-parallel groups"
)]
struct Cli {
    /// Config file (default: ~/.config/rankpart/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print results as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    parallel: ParallelArgs,

    #[command(subcommand)]
    command: Command,
}

// ─── Parallel Config ────────────────────────────────────────────────────
#[derive(Args, Debug, Default)]
struct ParallelArgs {
    /// Total number of processes.
    #[arg(long, global = true)]
    world_size: Option<usize>,

    /// Tensor parallel size.
    #[arg(long, global = true)]
    tensor_parallel_size: Option<usize>,

    /// Pipeline parallel size.
    #[arg(long, global = true)]
    pipeline_parallel_size: Option<usize>,

    /// Context parallel size.
    #[arg(long, global = true)]
    context_parallel_size: Option<usize>,

    /// Expert parallel size.
    #[arg(long, global = true)]
    expert_parallel_size: Option<usize>,

    /// Processes per host.
    #[arg(long, global = true)]
    local_world_size: Option<usize>,

    /// Requested replicas per data-parallel group.
    #[arg(long, global = true)]
    replica_count: Option<usize>,
}

impl ParallelArgs {
    fn to_planner_config(&self, log_level: Option<String>) -> PlannerConfig {
        PlannerConfig {
            world_size: self.world_size,
            tensor_parallel_size: self.tensor_parallel_size,
            pipeline_parallel_size: self.pipeline_parallel_size,
            context_parallel_size: self.context_parallel_size,
            expert_parallel_size: self.expert_parallel_size,
            local_world_size: self.local_world_size,
            replica_count: self.replica_count,
            log_level,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Split a rank group into replicas and report the caller's writers
    Partition {
        /// Caller's global rank (default: $RANK).
        #[arg(long)]
        rank: Option<usize>,

        /// Ascending comma-separated ranks of the group, e.g. 0,8,16,24.
        #[arg(long, value_parser = parse_ranks)]
        ranks: RankGroup,

        #[arg(long, value_enum, default_value_t = PurposeArg::SaveModel)]
        purpose: PurposeArg,
    },
    /// Two-way split: the single writer for the half holding an index
    SaveRank {
        /// Comma-separated ranks of the group.
        #[arg(long, value_delimiter = ',', required = true)]
        ranks: Vec<usize>,

        /// Caller's position within the group.
        #[arg(long)]
        index: usize,
    },
    /// Re-derive selection after ranks were removed
    ScaleIn {
        /// Surviving rank to compute for (default: $RANK).
        #[arg(long)]
        rank: Option<usize>,

        /// Group before the change.
        #[arg(long, value_parser = parse_ranks)]
        old: RankGroup,

        /// Group after the change.
        #[arg(long, value_parser = parse_ranks)]
        new: RankGroup,

        /// Rank declared faulted by the orchestrator.
        #[arg(long)]
        faulted: Option<usize>,

        #[arg(long, value_enum, default_value_t = PurposeArg::SaveModel)]
        purpose: PurposeArg,
    },
    /// Re-derive selection after ranks were added
    ScaleOut {
        /// Rank to compute for (default: $RANK).
        #[arg(long)]
        rank: Option<usize>,

        /// Group before the change.
        #[arg(long, value_parser = parse_ranks)]
        old: RankGroup,

        /// Group after the change.
        #[arg(long, value_parser = parse_ranks)]
        new: RankGroup,

        #[arg(long, value_enum, default_value_t = PurposeArg::SaveModel)]
        purpose: PurposeArg,
    },
    /// Print every rank's replica and writer roles for the configured job
    Plan {
        /// Communicator to partition.
        #[arg(long, value_enum, default_value_t = KindArg::DataParallel)]
        kind: KindArg,
    },
    /// Show the merged configuration
    Config {
        /// Persist the merged configuration to the config file.
        #[arg(long)]
        save: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PurposeArg {
    SaveOptim,
    SaveModel,
    LoadBroadcast,
}

impl From<PurposeArg> for Purpose {
    fn from(arg: PurposeArg) -> Self {
        match arg {
            PurposeArg::SaveOptim => Purpose::SaveOptim,
            PurposeArg::SaveModel => Purpose::SaveModel,
            PurposeArg::LoadBroadcast => Purpose::LoadBroadcast,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    DataParallel,
    DataParallelWithContext,
    ExpertDataParallel,
}

impl From<KindArg> for GroupKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::DataParallel => GroupKind::DataParallel,
            KindArg::DataParallelWithContext => GroupKind::DataParallelWithContext,
            KindArg::ExpertDataParallel => GroupKind::ExpertDataParallel,
        }
    }
}

fn parse_ranks(s: &str) -> Result<RankGroup, String> {
    let ranks = s
        .split(',')
        .map(|r| {
            r.trim()
                .parse::<usize>()
                .map_err(|e| format!("invalid rank '{}': {e}", r.trim()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    RankGroup::new(ranks).map_err(|e| e.to_string())
}

/// One rank's line of `rankpart plan`.
#[derive(Debug, Serialize)]
struct PlanRow {
    rank: usize,
    group: usize,
    replica_index: usize,
    replica: RankGroup,
    write_model: bool,
    write_optim: bool,
    load_role: LoadRole,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // File < launcher env < CLI.
    let mut cfg = match &cli.config {
        Some(path) => PlannerConfig::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PlannerConfig::load(),
    };
    cfg.merge(&PlannerConfig::from_env());
    cfg.merge(&cli.parallel.to_planner_config(cli.log_level.clone()));

    logging::init_with_level(cfg.log_level.as_deref().unwrap_or("warn"))?;
    if let Some(path) = cli.config.clone().or_else(PlannerConfig::default_path) {
        if path.exists() {
            tracing::info!(path = %path.display(), "loaded config");
        }
    }

    let json = cli.json;

    match cli.command {
        Command::Partition {
            rank,
            ranks,
            purpose,
        } => {
            let rank = rank.unwrap_or_else(|| RankIdentity::from_env().rank);
            let sel = partition(rank, &ranks, resolve_replica_count(&cfg)?, purpose.into())?;
            if json {
                print_json(&sel)?;
            } else {
                print_selection(rank, &sel);
            }
        }
        Command::SaveRank { ranks, index } => {
            let writer = select_save_rank(&ranks, resolve_replica_count(&cfg)?, index)?;
            if json {
                print_json(&serde_json::json!({ "index": index, "save_rank": writer }))?;
            } else {
                println!("save rank for index {index}: {writer}");
            }
        }
        Command::ScaleIn {
            rank,
            old,
            new,
            faulted,
            purpose,
        } => {
            let rank = rank.unwrap_or_else(|| RankIdentity::from_env().rank);
            let outcome = recompute_scale(
                ScaleKind::ScaleIn,
                rank,
                &old,
                &new,
                faulted,
                resolve_replica_count(&cfg)?,
                purpose.into(),
            )?;
            report_scale(rank, &outcome, json)?;
        }
        Command::ScaleOut {
            rank,
            old,
            new,
            purpose,
        } => {
            let rank = rank.unwrap_or_else(|| RankIdentity::from_env().rank);
            let outcome = recompute_scale(
                ScaleKind::ScaleOut,
                rank,
                &old,
                &new,
                None,
                resolve_replica_count(&cfg)?,
                purpose.into(),
            )?;
            report_scale(rank, &outcome, json)?;
        }
        Command::Plan { kind } => {
            let rows = plan(&cfg, kind.into())?;
            if json {
                print_json(&rows)?;
            } else {
                for row in &rows {
                    println!(
                        "rank {:>5}  group {:>4}  replica {:>3} {}  {}",
                        row.rank,
                        row.group,
                        row.replica_index,
                        row.replica,
                        roles(row)
                    );
                }
            }
        }
        Command::Config { save } => {
            if save {
                let path = match &cli.config {
                    Some(path) => {
                        cfg.save_to(path)?;
                        path.clone()
                    }
                    None => cfg.save()?,
                };
                eprintln!("Saved config to: {}", path.display());
            }
            if json {
                print_json(&cfg)?;
            } else {
                print!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
    }

    Ok(())
}

/// Replica count for the per-group subcommands.
///
/// Without a configured `world_size` there is no job shape to check hosts
/// against and the requested count is used as is. Otherwise the host
/// feasibility check applies, matching `plan`.
fn resolve_replica_count(cfg: &PlannerConfig) -> anyhow::Result<usize> {
    let requested = cfg.replica_count.unwrap_or(1);
    if cfg.world_size.is_none() {
        return Ok(requested);
    }
    let (replica_count, _) = cfg.to_parallel_config()?.effective_replica_count();
    Ok(replica_count)
}

/// Recompute in the direction the operator asked for. A change that goes
/// the other way is rejected rather than reclassified.
fn recompute_scale(
    direction: ScaleKind,
    rank: usize,
    old: &RankGroup,
    new: &RankGroup,
    faulted: Option<usize>,
    replica_count: usize,
    purpose: Purpose,
) -> rankpart_core::Result<ScaleOutcome> {
    let outcome = match direction {
        ScaleKind::ScaleIn => ScaleOutcome::ScaleIn(recompute_after_scale_in(
            rank,
            old,
            new,
            faulted,
            replica_count,
            purpose,
        )?),
        ScaleKind::ScaleOut => ScaleOutcome::ScaleOut(recompute_after_scale_out(
            rank,
            old,
            new,
            replica_count,
            purpose,
        )?),
        ScaleKind::Unchanged => {
            ScaleOutcome::Unchanged(partition(rank, new, replica_count, purpose)?)
        }
    };
    tracing::info!(rank, ?direction, "recomputed selection");
    Ok(outcome)
}

fn report_scale(rank: usize, outcome: &ScaleOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(outcome);
    }
    match outcome {
        ScaleOutcome::ScaleIn(out) => {
            println!(
                "removed positions {:?} (in my replica: {:?})",
                out.report.fault_indices_in_old_group, out.report.fault_local_indices_in_replica
            );
            for (i, change) in out.replicas.iter().enumerate() {
                println!("old replica {i}: {change:?}");
            }
        }
        ScaleOutcome::ScaleOut(out) => println!("added ranks {:?}", out.added),
        ScaleOutcome::Unchanged(_) => println!("group unchanged"),
    }
    print_selection(rank, outcome.selection());
    Ok(())
}

/// Resolve every rank of every synthesized group of `kind`.
fn plan(cfg: &PlannerConfig, kind: GroupKind) -> anyhow::Result<Vec<PlanRow>> {
    let parallel = cfg.to_parallel_config()?;
    let groups = SyntheticGroups::new(parallel)?;
    // Logs its own warning when the count degrades.
    let (replica_count, _) = parallel.effective_replica_count();

    let mut cache = SelectionCache::new();
    let mut rows = Vec::with_capacity(parallel.world_size);
    for (index, group) in groups.all_groups(kind)?.iter().enumerate() {
        for (position, &rank) in group.ranks().iter().enumerate() {
            let sel = cache.select(rank, group, replica_count, Purpose::SaveModel)?;
            let write_optim = match kind {
                GroupKind::ExpertDataParallel => {
                    select_save_rank(group.ranks(), sel.replica_count, position)? == rank
                }
                _ => sel.is_optim_writer(rank),
            };
            rows.push(PlanRow {
                rank,
                group: index,
                replica_index: sel.replica_index,
                write_model: sel.is_model_writer(rank),
                write_optim,
                load_role: sel.load_role(rank),
                replica: sel.process_group_ranks,
            });
        }
    }
    rows.sort_by_key(|r| r.rank);

    let (hits, misses) = cache.stats();
    tracing::debug!(%kind, groups = cache.len(), hits, misses, "plan resolved");
    Ok(rows)
}

fn roles(row: &PlanRow) -> String {
    match (row.write_model, row.write_optim) {
        (true, true) => "model+optim".to_string(),
        (true, false) => "model".to_string(),
        (false, true) => "optim".to_string(),
        (false, false) => "-".to_string(),
    }
}

fn print_selection(rank: usize, sel: &SelectionResult) {
    println!(
        "rank {rank}: replica {}/{} {}",
        sel.replica_index, sel.replica_count, sel.process_group_ranks
    );
    println!("  model rank: {}", sel.selected_model_rank);
    println!("  optim rank: {}", sel.selected_optim_rank);
    println!("  load role:  {:?}", sel.load_role(rank));
    if let Some(d) = &sel.degradation {
        println!("  degraded:   {d}");
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
