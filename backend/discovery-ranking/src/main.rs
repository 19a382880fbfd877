use anyhow::Context;
use discovery_ranking::jobs::TrainingJob;
use discovery_ranking::services::{EvaluationGroup, Evaluator, ModelRegistry, RankingPipeline};
use discovery_ranking::synthetic::{split_users, SyntheticConfig};
use discovery_ranking::Config;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env().context("Failed to load config")?;

    info!(
        users = config.synthetic.users,
        items = config.synthetic.items,
        cutoff = config.evaluation.cutoff,
        "Starting offline discovery ranking run"
    );

    let snapshot = Arc::new(
        config
            .synthetic
            .generate(SyntheticConfig::default_as_of())
            .context("Failed to generate snapshot")?,
    );

    let (train_users, holdout_users) = split_users(
        &snapshot.interactions.users(),
        config.evaluation.holdout_fraction,
        config.training.seed,
    );
    info!(
        train = train_users.len(),
        holdout = holdout_users.len(),
        "Users split"
    );

    // Train and publish
    let registry = Arc::new(ModelRegistry::default());
    let job = TrainingJob::new(
        Arc::clone(&snapshot),
        config.features.clone(),
        config.training.clone(),
        Arc::clone(&registry),
    )?;
    let outcome = job.run(&train_users).await.context("Training failed")?;
    if !outcome.report.degenerate_groups.is_empty() {
        warn!(
            degenerate = outcome.report.degenerate_groups.len(),
            "Training groups excluded"
        );
    }

    // Rank one sample session
    let pipeline = Arc::new(RankingPipeline::new(
        Arc::clone(&snapshot),
        &config,
        Arc::clone(&registry),
    )?);
    if let Some(user_id) = holdout_users.first().or_else(|| train_users.first()) {
        let mut session = snapshot.context_or_neutral(user_id);
        session.session_id = Uuid::new_v4().to_string();

        for response in pipeline.rank_sessions(vec![session]).await {
            let response = response?;
            let top: Vec<_> = response
                .items
                .iter()
                .take(config.evaluation.cutoff)
                .map(|item| {
                    json!({
                        "rank": item.final_rank,
                        "item_id": item.item_id,
                        "score": item.model_score,
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "session_id": response.session_id,
                    "user_id": user_id,
                    "candidate_source": response.candidate_source,
                    "model_version": response.model_version,
                    "items": top,
                    "failures": response.failures.len(),
                    "rule_decisions": response.rule_decisions,
                }))?
            );
        }
    }

    // Offline evaluation on held-out users
    let holdout = job.builder().build(&holdout_users)?;
    let groups = EvaluationGroup::from_training_set(&holdout.set);
    let evaluator = Evaluator::new(config.evaluation.cutoff)?;
    let report = evaluator.evaluate(&registry.current().model, &groups)?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
