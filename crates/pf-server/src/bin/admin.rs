//! Administrative maintenance tasks: seed TL corpora, prune answers, expire
//! orphaned rounds, retire idle guests. Exit code 0 on success, nonzero on
//! any failure.
use clap::Parser;
use clap::Subcommand;
use pf_core::ID;
use pf_core::Settings;
use pf_database::Database;
use pf_engine::RoundEngine;
use pf_matching::assign_cluster;
use pf_matching::prune_corpus;
use pf_records::PlayerRepository;
use pf_records::RoundRepository;
use pf_records::TlAnswer;
use pf_records::TlPrompt;
use pf_records::TlRepository;
use pf_server::compose;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "admin", about = "phraseforge maintenance tasks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed TL prompts from a newline-delimited file.
    SeedTlPrompts {
        #[arg(long)]
        file: String,
    },
    /// Seed TL answers for a prompt from a newline-delimited file.
    /// Requires a configured embedding provider.
    SeedTlAnswers {
        #[arg(long)]
        prompt_id: uuid::Uuid,
        #[arg(long)]
        file: String,
    },
    /// Prune a prompt's answer corpus back under the active cap.
    PruneTl {
        #[arg(long)]
        prompt_id: uuid::Uuid,
    },
    /// Expire every round past its grace-adjusted deadline.
    ExpireOrphans,
    /// Soft-anonymize guest accounts idle for the given number of days.
    CleanupGuests {
        #[arg(long, default_value_t = 30)]
        days: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pf_core::log();
    let settings = Settings::from_env();
    let database = Database::from_env();
    let state = compose(settings, database.clone(), None, None);
    let db = database.session().await?;

    match Cli::parse().command {
        Command::SeedTlPrompts { file } => {
            let text = std::fs::read_to_string(&file)?;
            let mut count = 0usize;
            for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let prompt = TlPrompt {
                    prompt_id: ID::default(),
                    text: line.to_string(),
                    is_active: true,
                    created_at: state.ctx.now(),
                };
                db.insert_prompt(&prompt).await?;
                count += 1;
            }
            log::info!("seeded {} TL prompt(s)", count);
        }
        Command::SeedTlAnswers { prompt_id, file } => {
            let text = std::fs::read_to_string(&file)?;
            let prompt = db
                .prompt(ID::from(prompt_id))
                .await?
                .ok_or_else(|| anyhow::anyhow!("prompt {} not found", prompt_id))?;
            let prompt_embedding = state
                .embeddings
                .embedding(&db, &prompt.text, state.ctx.now())
                .await?;
            let mut count = 0usize;
            for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let now = state.ctx.now();
                let embedding = state.embeddings.embedding(&db, line, now).await?;
                let (related, similarity) = pf_matching::on_topic(
                    &prompt_embedding,
                    &embedding,
                    state.ctx.settings.tl_topic_threshold,
                );
                if !related {
                    log::warn!("skipping off-topic answer {:?} (sim {:.2})", line, similarity);
                    continue;
                }
                let answer = TlAnswer {
                    answer_id: ID::default(),
                    prompt_id: ID::from(prompt_id),
                    text: line.to_string(),
                    embedding: embedding.clone(),
                    cluster_id: None,
                    answer_players_count: 1,
                    shows: 0,
                    contributed_matches: 0,
                    is_active: true,
                    created_at: now,
                };
                db.insert_answer(&answer).await?;
                assign_cluster(
                    &db,
                    &state.ctx.settings,
                    ID::from(prompt_id),
                    answer.answer_id,
                    &embedding,
                    now,
                )
                .await?;
                count += 1;
            }
            log::info!("seeded {} TL answer(s) for prompt {}", count, prompt_id);
        }
        Command::PruneTl { prompt_id } => {
            let (removed, remaining) = prune_corpus(
                &db,
                ID::from(prompt_id),
                state.ctx.settings.tl_active_corpus_cap,
            )
            .await?;
            log::info!("pruned {} answer(s), {} remain", removed, remaining);
        }
        Command::ExpireOrphans => {
            let engine = RoundEngine::new(state.ctx.clone());
            let grace = Duration::from_secs(state.ctx.settings.grace_period_seconds);
            let deadline = state.ctx.now() - grace;
            let candidates = db.expired_candidates(deadline).await?;
            let total = candidates.len();
            for round in candidates {
                engine.expire_round(&db, &round).await?;
            }
            log::info!("expired {} orphaned round(s)", total);
        }
        Command::CleanupGuests { days } => {
            let cutoff = state.ctx.now() - Duration::from_secs(days * 86_400);
            let idle = db.inactive_guests(cutoff).await?;
            let total = idle.len();
            for guest in idle {
                // Rounds and ledger rows stay; the identity goes.
                let placeholder = format!("retired_{}", guest.player_id.inner().simple());
                db.anonymize_player(guest.player_id, &placeholder).await?;
            }
            log::info!("anonymized {} idle guest account(s)", total);
        }
    }
    Ok(())
}
