//! The slowly-evolving per-company knowledge base. One record per owner,
//! read at the start of a run and merged (never overwritten wholesale) at the
//! end. Merge failures are absorbed by the caller; this module never fails a
//! report run on its own.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::ReportInput;

/// Newest-first cap on `recent_developments`
const RECENT_DEVELOPMENTS_CAP: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyKnowledge {
    pub company_name: String,
    pub company_domain: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub competitors: Vec<String>,
    #[serde(default)]
    pub market_position: Option<String>,
    #[serde(default)]
    pub key_products: Vec<String>,
    #[serde(default)]
    pub strategic_focus: Vec<String>,
    /// Most-recent-first, capped at [`RECENT_DEVELOPMENTS_CAP`]
    #[serde(default)]
    pub recent_developments: Vec<String>,
    /// Keyed by competitor name
    #[serde(default)]
    pub competitive_insights: HashMap<String, String>,
}

impl CompanyKnowledge {
    /// First-run initialization from the report input's own fields
    pub fn from_input(input: &ReportInput) -> Self {
        Self {
            company_name: input.company_name.clone(),
            company_domain: input.company_domain.clone(),
            industry: input.industry.clone(),
            competitors: input.competitors.clone(),
            market_position: None,
            key_products: Vec::new(),
            strategic_focus: Vec::new(),
            recent_developments: Vec::new(),
            competitive_insights: HashMap::new(),
        }
    }

    /// Additive merge. Set-like fields union, developments prepend and
    /// truncate, insights shallow-merge by competitor, market position
    /// overwrites only when the update carries one.
    pub fn merge(&mut self, update: KnowledgeUpdate) {
        if let Some(competitors) = update.competitors {
            union_into(&mut self.competitors, competitors);
        }
        if let Some(products) = update.key_products {
            union_into(&mut self.key_products, products);
        }
        if let Some(focus) = update.strategic_focus {
            union_into(&mut self.strategic_focus, focus);
        }
        if let Some(developments) = update.new_developments {
            let mut merged = developments;
            merged.extend(self.recent_developments.drain(..));
            merged.truncate(RECENT_DEVELOPMENTS_CAP);
            self.recent_developments = merged;
        }
        if let Some(insights) = update.competitive_insights {
            for (competitor, insight) in insights {
                self.competitive_insights.insert(competitor, insight);
            }
        }
        if let Some(position) = update.market_position {
            self.market_position = Some(position);
        }
    }

    /// Short context block embedded in selection/summarization prompts
    pub fn prompt_context(&self) -> String {
        let mut lines = vec![format!("Known context about {}:", self.company_name)];
        if let Some(position) = &self.market_position {
            lines.push(format!("- Market position: {}", position));
        }
        if !self.key_products.is_empty() {
            lines.push(format!("- Key products: {}", self.key_products.join(", ")));
        }
        if !self.strategic_focus.is_empty() {
            lines.push(format!(
                "- Strategic focus: {}",
                self.strategic_focus.join(", ")
            ));
        }
        if !self.recent_developments.is_empty() {
            lines.push(format!(
                "- Recent developments: {}",
                self.recent_developments.join("; ")
            ));
        }
        lines.join("\n")
    }
}

fn union_into(existing: &mut Vec<String>, additions: Vec<String>) {
    for item in additions {
        let item = item.trim().to_string();
        if item.is_empty() {
            continue;
        }
        if !existing.iter().any(|e| e.eq_ignore_ascii_case(&item)) {
            existing.push(item);
        }
    }
}

/// Extraction result over one finished report. Every field is optional: the
/// extraction prompt instructs the model to return null for fields the report
/// says nothing new about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeUpdate {
    #[serde(default)]
    pub competitors: Option<Vec<String>>,
    #[serde(default)]
    pub market_position: Option<String>,
    #[serde(default)]
    pub key_products: Option<Vec<String>>,
    #[serde(default)]
    pub strategic_focus: Option<Vec<String>>,
    #[serde(default)]
    pub new_developments: Option<Vec<String>>,
    #[serde(default)]
    pub competitive_insights: Option<HashMap<String, String>>,
}

/// Keyed read/upsert of one knowledge record per owner.
///
/// Concurrent runs for the same owner are not serialized here; callers that
/// run reports concurrently must serialize per owner themselves.
#[async_trait]
pub trait KnowledgeStorage: Send + Sync {
    async fn get(&self, owner_id: &str) -> anyhow::Result<Option<CompanyKnowledge>>;
    async fn upsert(&self, owner_id: &str, knowledge: CompanyKnowledge) -> anyhow::Result<()>;
}

/// In-memory implementation of KnowledgeStorage
pub struct InMemoryKnowledgeStorage {
    records: Arc<DashMap<String, CompanyKnowledge>>,
}

impl InMemoryKnowledgeStorage {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryKnowledgeStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeStorage for InMemoryKnowledgeStorage {
    async fn get(&self, owner_id: &str) -> anyhow::Result<Option<CompanyKnowledge>> {
        Ok(self.records.get(owner_id).map(|entry| entry.clone()))
    }

    async fn upsert(&self, owner_id: &str, knowledge: CompanyKnowledge) -> anyhow::Result<()> {
        self.records.insert(owner_id.to_string(), knowledge);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportType;

    fn input() -> ReportInput {
        ReportInput {
            company_name: "Acme".to_string(),
            company_domain: "acme.com".to_string(),
            industry: Some("robotics".to_string()),
            competitors: vec!["Initech".to_string()],
            report_type: ReportType::Weekly,
            date_range_days: 7,
            last_report_at: None,
            owner_id: Some("owner-1".to_string()),
            min_articles: 0,
            use_deep_research: true,
        }
    }

    #[test]
    fn merge_unions_competitors_without_duplicates() {
        let mut knowledge = CompanyKnowledge::from_input(&input());
        knowledge.merge(KnowledgeUpdate {
            competitors: Some(vec!["Globex".to_string()]),
            ..Default::default()
        });
        knowledge.merge(KnowledgeUpdate {
            competitors: Some(vec!["Globex".to_string(), "Hooli".to_string()]),
            ..Default::default()
        });
        assert_eq!(knowledge.competitors, vec!["Initech", "Globex", "Hooli"]);
    }

    #[test]
    fn developments_stay_newest_first_and_capped() {
        let mut knowledge = CompanyKnowledge::from_input(&input());
        for i in 0..15 {
            knowledge.merge(KnowledgeUpdate {
                new_developments: Some(vec![format!("development {}", i)]),
                ..Default::default()
            });
        }
        assert_eq!(knowledge.recent_developments.len(), 10);
        assert_eq!(knowledge.recent_developments[0], "development 14");
        assert_eq!(knowledge.recent_developments[9], "development 5");
    }

    #[test]
    fn market_position_only_overwritten_by_some() {
        let mut knowledge = CompanyKnowledge::from_input(&input());
        knowledge.merge(KnowledgeUpdate {
            market_position: Some("challenger".to_string()),
            ..Default::default()
        });
        knowledge.merge(KnowledgeUpdate::default());
        assert_eq!(knowledge.market_position.as_deref(), Some("challenger"));
    }

    #[test]
    fn insights_shallow_merge_by_competitor() {
        let mut knowledge = CompanyKnowledge::from_input(&input());
        knowledge.merge(KnowledgeUpdate {
            competitive_insights: Some(HashMap::from([(
                "Initech".to_string(),
                "old take".to_string(),
            )])),
            ..Default::default()
        });
        knowledge.merge(KnowledgeUpdate {
            competitive_insights: Some(HashMap::from([
                ("Initech".to_string(), "new take".to_string()),
                ("Globex".to_string(), "emerging".to_string()),
            ])),
            ..Default::default()
        });
        assert_eq!(
            knowledge.competitive_insights.get("Initech").unwrap(),
            "new take"
        );
        assert_eq!(knowledge.competitive_insights.len(), 2);
    }
}
