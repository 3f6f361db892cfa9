use crate::cosine;
use pf_core::Component;
use pf_core::GameResult;
use pf_core::ID;
use pf_core::Settings;
use pf_core::Similarity;
use pf_records::TlAnswer;
use pf_records::TlCluster;
use pf_records::TlPrompt;
use pf_records::TlRepository;
use std::collections::HashMap;
use std::time::SystemTime;
use tokio_postgres::GenericClient;

/// Running arithmetic mean update for a centroid absorbing one new member.
pub fn running_mean(old: &[Component], size: i32, new: &[Component]) -> Vec<Component> {
    let n = size as f32;
    old.iter()
        .zip(new.iter())
        .map(|(o, e)| (o * n + e) / (n + 1.0))
        .collect()
}

/// Weight of one answer: `1 + ln(1 + min(players, 20))`. The cap keeps a
/// single viral answer from dominating coverage.
pub fn answer_weight(players_count: i32) -> f64 {
    let capped = players_count.clamp(0, 20) as f64;
    1.0 + (1.0 + capped).ln()
}

/// Usefulness of an answer for pruning: matches contributed per show, with
/// +1 smoothing in the denominator.
pub fn usefulness(contributed_matches: i32, shows: i32) -> f64 {
    f64::from(contributed_matches) / f64::from(shows + 1)
}

/// Outcome of a cluster assignment.
#[derive(Debug, Clone)]
pub struct ClusterAssignment {
    pub cluster_id: ID<TlCluster>,
    /// False when a new singleton cluster was created.
    pub joined: bool,
    pub similarity: Similarity,
    /// Best similarity cleared the duplicate threshold; recorded, not
    /// enforced.
    pub near_duplicate: bool,
}

/// Assign an answer to the best-matching cluster for its prompt, or create
/// a singleton. Joining updates the centroid by running mean.
pub async fn assign_cluster<C: GenericClient + Sync>(
    db: &C,
    settings: &Settings,
    prompt: ID<TlPrompt>,
    answer: ID<TlAnswer>,
    embedding: &[Component],
    now: SystemTime,
) -> GameResult<ClusterAssignment> {
    let clusters = db.clusters_for_prompt(prompt).await?;
    let best = clusters
        .iter()
        .map(|c| (c, cosine(embedding, &c.centroid)))
        .max_by(|(_, a), (_, b)| a.total_cmp(b));

    if let Some((cluster, similarity)) = best {
        if similarity >= settings.tl_cluster_join_threshold {
            let centroid = running_mean(&cluster.centroid, cluster.size, embedding);
            db.update_centroid(cluster.cluster_id, &centroid, cluster.size + 1, now)
                .await?;
            db.set_answer_cluster(answer, cluster.cluster_id).await?;
            log::debug!(
                "[clusters] answer {} joined {} (sim {:.3})",
                answer,
                cluster.cluster_id,
                similarity
            );
            return Ok(ClusterAssignment {
                cluster_id: cluster.cluster_id,
                joined: true,
                similarity,
                near_duplicate: similarity >= settings.tl_cluster_duplicate_threshold,
            });
        }
    }

    let fresh = TlCluster {
        cluster_id: ID::default(),
        prompt_id: prompt,
        centroid: embedding.to_vec(),
        size: 1,
        example_answer_id: answer,
        created_at: now,
        updated_at: now,
    };
    db.insert_cluster(&fresh).await?;
    db.set_answer_cluster(answer, fresh.cluster_id).await?;
    log::debug!("[clusters] answer {} started {}", answer, fresh.cluster_id);
    Ok(ClusterAssignment {
        cluster_id: fresh.cluster_id,
        joined: false,
        similarity: best.map(|(_, s)| s).unwrap_or(0.0),
        near_duplicate: false,
    })
}

/// Total weight of the active answers in the given clusters.
pub async fn cluster_weight<C: GenericClient + Sync>(
    db: &C,
    cluster_ids: &[uuid::Uuid],
) -> GameResult<f64> {
    if cluster_ids.is_empty() {
        return Ok(0.0);
    }
    let answers = db.active_answers_in_clusters(cluster_ids).await?;
    Ok(answers
        .iter()
        .map(|a| answer_weight(a.answer_players_count))
        .sum())
}

/// Minimal answer facts the pruning planner needs.
#[derive(Debug, Clone)]
pub struct PruneCandidate {
    pub answer_id: uuid::Uuid,
    pub cluster_id: Option<uuid::Uuid>,
    pub contributed_matches: i32,
    pub shows: i32,
}

/// Choose which answers to deactivate to get the corpus back under `cap`.
/// Lowest usefulness goes first; the last active member of any cluster is
/// never chosen, preserving the cluster's future referents.
pub fn plan_pruning(candidates: &[PruneCandidate], cap: usize) -> Vec<uuid::Uuid> {
    if candidates.len() <= cap {
        return Vec::new();
    }
    let mut cluster_sizes: HashMap<uuid::Uuid, usize> = HashMap::new();
    for candidate in candidates {
        if let Some(cluster) = candidate.cluster_id {
            *cluster_sizes.entry(cluster).or_default() += 1;
        }
    }
    let mut scored: Vec<&PruneCandidate> = candidates.iter().collect();
    scored.sort_by(|a, b| {
        usefulness(a.contributed_matches, a.shows)
            .total_cmp(&usefulness(b.contributed_matches, b.shows))
    });

    let overage = candidates.len() - cap;
    let mut removed = Vec::with_capacity(overage);
    for candidate in scored {
        if removed.len() >= overage {
            break;
        }
        if let Some(cluster) = candidate.cluster_id {
            let remaining = cluster_sizes[&cluster];
            if remaining <= 1 {
                continue;
            }
            *cluster_sizes.get_mut(&cluster).unwrap() = remaining - 1;
        }
        removed.push(candidate.answer_id);
    }
    removed
}

/// Apply the pruning plan for a prompt. Returns (removed, remaining_active).
pub async fn prune_corpus<C: GenericClient + Sync>(
    db: &C,
    prompt: ID<TlPrompt>,
    cap: usize,
) -> GameResult<(usize, usize)> {
    let active = db.active_answers(prompt, i64::MAX).await?;
    let candidates: Vec<PruneCandidate> = active
        .iter()
        .map(|a| PruneCandidate {
            answer_id: a.answer_id.inner(),
            cluster_id: a.cluster_id.map(|id| id.inner()),
            contributed_matches: a.contributed_matches,
            shows: a.shows,
        })
        .collect();
    let plan = plan_pruning(&candidates, cap);
    for answer_id in &plan {
        db.deactivate_answer(ID::from(*answer_id)).await?;
    }
    if !plan.is_empty() {
        log::info!(
            "[clusters] pruned {} answer(s) for prompt {} ({} remain)",
            plan.len(),
            prompt,
            active.len() - plan.len()
        );
    }
    Ok((plan.len(), active.len() - plan.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_mean_is_arithmetic_mean() {
        // three members, centroid must equal the mean of all three
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        let c = vec![1.0, 1.0];
        let after_two = running_mean(&a, 1, &b);
        let after_three = running_mean(&after_two, 2, &c);
        let expected = [(1.0 + 0.0 + 1.0) / 3.0, (0.0 + 1.0 + 1.0) / 3.0];
        for (got, want) in after_three.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn answer_weight_caps_player_count() {
        assert_eq!(answer_weight(0), 1.0);
        assert_eq!(answer_weight(20), answer_weight(200));
        assert!(answer_weight(5) > answer_weight(1));
    }

    #[test]
    fn usefulness_smooths_zero_shows() {
        assert_eq!(usefulness(0, 0), 0.0);
        assert_eq!(usefulness(3, 0), 3.0);
        assert_eq!(usefulness(2, 3), 0.5);
    }

    fn candidate(
        cluster: Option<uuid::Uuid>,
        contributed: i32,
        shows: i32,
    ) -> PruneCandidate {
        PruneCandidate {
            answer_id: uuid::Uuid::now_v7(),
            cluster_id: cluster,
            contributed_matches: contributed,
            shows,
        }
    }

    #[test]
    fn pruning_removes_lowest_usefulness_first() {
        let cluster = uuid::Uuid::now_v7();
        let low = candidate(Some(cluster), 0, 10);
        let mid = candidate(Some(cluster), 5, 10);
        let high = candidate(Some(cluster), 10, 10);
        let plan = plan_pruning(&[high.clone(), low.clone(), mid.clone()], 2);
        assert_eq!(plan, vec![low.answer_id]);
    }

    #[test]
    fn pruning_never_empties_a_cluster() {
        let lonely = uuid::Uuid::now_v7();
        let crowded = uuid::Uuid::now_v7();
        // the lone member scores worst but must survive
        let keeper = candidate(Some(lonely), 0, 100);
        let filler: Vec<PruneCandidate> =
            (0..4).map(|i| candidate(Some(crowded), i + 1, 1)).collect();
        let mut all = vec![keeper.clone()];
        all.extend(filler);
        let plan = plan_pruning(&all, 2);
        assert_eq!(plan.len(), 3);
        assert!(!plan.contains(&keeper.answer_id));
    }

    #[test]
    fn pruning_noop_within_cap() {
        let c = candidate(None, 1, 1);
        assert!(plan_pruning(&[c], 10).is_empty());
    }
}
