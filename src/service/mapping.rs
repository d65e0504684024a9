use sqlx::PgPool;
use std::error::Error;

use crate::db::queries_alias;
use crate::models::{AliasMatch, EstimateLineCandidate, MatchSource, ProductAlias};

/// Similarity between two free-text names, scored 0..=100. Pluggable so the
/// metric can be swapped without touching the resolution order.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &str, b: &str) -> u8;
}

/// Default scorer: lowercase, split on non-alphanumerics, sort the tokens,
/// then take the better of normalized edit similarity over the token-sorted
/// strings and the shared-token ratio. Token sorting makes the score
/// insensitive to word order, which supplier names shuffle freely ("Cement
/// M500 bag" vs "bag cement M500"); the shared-token ratio scores a name
/// whose tokens all appear in a longer candidate as a full match. Jaro-style
/// metrics are not used: they score short unrelated names too high for an
/// auto-suggestion floor.
pub struct TokenSortScorer;

fn tokens(s: &str) -> Vec<String> {
    let mut tokens: Vec<String> = s
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

impl SimilarityScorer for TokenSortScorer {
    fn score(&self, a: &str, b: &str) -> u8 {
        let (ta, tb) = (tokens(a), tokens(b));
        if ta.is_empty() || tb.is_empty() {
            return 0;
        }
        let edit = strsim::normalized_levenshtein(&ta.join(" "), &tb.join(" "));
        let common = ta.iter().filter(|t| tb.contains(t)).count();
        let overlap = common as f64 / ta.len().min(tb.len()) as f64;
        (edit.max(overlap) * 100.0).round() as u8
    }
}

/// Picks the best exact alias: supplier-scoped wins at confidence 100, a
/// global (null-scoped) alias is discounted to 95 since it ignores supplier
/// context. Pure function over the rows fetched for one product name.
fn resolve_exact(rows: &[ProductAlias], supplier_tax_id: Option<&str>) -> Option<AliasMatch> {
    if let Some(tax_id) = supplier_tax_id {
        if let Some(row) = rows.iter().find(|r| r.supplier_tax_id.as_deref() == Some(tax_id)) {
            return Some(AliasMatch {
                canonical_name: row.canonical_name.clone(),
                estimate_line_id: row.estimate_line_id,
                confidence: 100,
                source: MatchSource::SupplierAlias,
            });
        }
    }
    rows.iter()
        .find(|r| r.supplier_tax_id.is_none())
        .map(|row| AliasMatch {
            canonical_name: row.canonical_name.clone(),
            estimate_line_id: row.estimate_line_id,
            confidence: 95,
            source: MatchSource::GlobalAlias,
        })
}

/// Best fuzzy candidate at or above the confidence floor.
fn resolve_fuzzy(
    scorer: &dyn SimilarityScorer,
    product_name: &str,
    candidates: &[EstimateLineCandidate],
    min_confidence: u8,
) -> Option<AliasMatch> {
    candidates
        .iter()
        .map(|c| (scorer.score(product_name, &c.name), c))
        .filter(|(score, _)| *score >= min_confidence)
        .max_by_key(|(score, _)| *score)
        .map(|(score, c)| AliasMatch {
            canonical_name: c.name.clone(),
            estimate_line_id: Some(c.id),
            confidence: score,
            source: MatchSource::Fuzzy,
        })
}

/// Smart mapping: learned exact aliases first, fuzzy similarity as the
/// cold-start fallback. The alias table converges toward zero fuzzy lookups
/// for recurring suppliers.
pub struct MappingService {
    pool: PgPool,
    scorer: Box<dyn SimilarityScorer>,
    min_confidence: u8,
}

impl MappingService {
    pub fn new(pool: PgPool, min_confidence: u8) -> Self {
        Self { pool, scorer: Box::new(TokenSortScorer), min_confidence }
    }

    pub fn with_scorer(pool: PgPool, scorer: Box<dyn SimilarityScorer>, min_confidence: u8) -> Self {
        Self { pool, scorer, min_confidence }
    }

    /// Resolution order, first hit wins: supplier-scoped alias, global alias,
    /// fuzzy match against the estimate's candidate lines.
    pub async fn find_best_match(
        &self,
        product_name: &str,
        supplier_tax_id: Option<&str>,
        estimate_id: Option<i64>,
        min_confidence: Option<u8>,
    ) -> Result<Option<AliasMatch>, Box<dyn Error>> {
        let rows = queries_alias::find_aliases(&self.pool, product_name, supplier_tax_id).await?;
        if let Some(found) = resolve_exact(&rows, supplier_tax_id) {
            // Exact hits count as reuse even before the user confirms.
            let scope = match found.source {
                MatchSource::SupplierAlias => supplier_tax_id,
                _ => None,
            };
            if let Some(row) = rows.iter().find(|r| r.supplier_tax_id.as_deref() == scope) {
                queries_alias::touch_alias(&self.pool, row.id).await?;
            }
            tracing::info!(
                "Alias hit for '{}': '{}' (confidence {})",
                product_name,
                found.canonical_name,
                found.confidence
            );
            return Ok(Some(found));
        }

        let Some(estimate_id) = estimate_id else {
            return Ok(None);
        };
        let candidates = queries_alias::list_estimate_lines(&self.pool, estimate_id).await?;
        let floor = min_confidence.unwrap_or(self.min_confidence);
        let found = resolve_fuzzy(self.scorer.as_ref(), product_name, &candidates, floor);
        if let Some(m) = &found {
            tracing::info!(
                "Fuzzy match for '{}': '{}' (score {}, floor {})",
                product_name,
                m.canonical_name,
                m.confidence,
                floor
            );
        }
        Ok(found)
    }

    /// Records a mapping. A manual confirmation always forces confidence 100;
    /// automatic learning writes 80 and never demotes a human-confirmed row.
    /// Aliases are permanent: there is no deletion or expiry path.
    pub async fn learn_mapping(
        &self,
        product_name: &str,
        canonical_name: &str,
        estimate_line_id: Option<i64>,
        supplier_tax_id: Option<&str>,
        is_manual: bool,
    ) -> Result<(), Box<dyn Error>> {
        let confidence: i16 = if is_manual { 100 } else { 80 };
        queries_alias::upsert_alias(
            &self.pool,
            product_name,
            supplier_tax_id,
            canonical_name,
            estimate_line_id,
            confidence,
            is_manual,
        )
        .await?;
        tracing::info!(
            "Learned mapping '{}' -> '{}' ({}, scope {:?})",
            product_name,
            canonical_name,
            if is_manual { "manual" } else { "automatic" },
            supplier_tax_id
        );
        Ok(())
    }
}
