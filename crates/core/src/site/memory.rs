//! In-memory implementation of the persistence seams.
//!
//! Backs the server when no external store is wired in and is the store
//! used throughout the tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::store::{GraphStore, Leaderboard, SiteRepository, StoreError, TranscriptStore};
use super::types::{
    Discovery, GraphNode, GraphRelationship, PointsAward, SiteComponent, SiteRecord, SiteStatus,
    SITE_LABEL,
};
use crate::deliberation::Transcript;

#[derive(Debug, Clone)]
struct StoredTranscript {
    site_id: String,
    user_id: Option<String>,
    transcript: Transcript,
}

/// Holds every collection behind its own lock.
#[derive(Debug, Default, Clone)]
pub struct MemorySiteStore {
    sites: Arc<RwLock<HashMap<String, SiteRecord>>>,
    nodes: Arc<RwLock<HashMap<(String, String), GraphNode>>>,
    relationships: Arc<RwLock<HashSet<GraphRelationship>>>,
    transcripts: Arc<RwLock<HashMap<String, StoredTranscript>>>,
    discoveries: Arc<RwLock<HashMap<(String, String), Discovery>>>,
    awards: Arc<RwLock<HashMap<(String, String), PointsAward>>>,
}

impl MemorySiteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn node(&self, label: &str, key: &str) -> Option<GraphNode> {
        self.nodes
            .read()
            .await
            .get(&(label.to_string(), key.to_string()))
            .cloned()
    }

    pub async fn node_count(&self, label: &str) -> usize {
        self.nodes
            .read()
            .await
            .keys()
            .filter(|(l, _)| l == label)
            .count()
    }

    pub async fn relationships(&self) -> Vec<GraphRelationship> {
        let mut rels: Vec<_> = self.relationships.read().await.iter().cloned().collect();
        rels.sort_by(|a, b| {
            (&a.from_key, &a.kind, &a.to_key).cmp(&(&b.from_key, &b.kind, &b.to_key))
        });
        rels
    }

    pub async fn discoveries(&self, user_id: &str) -> Vec<Discovery> {
        self.discoveries
            .read()
            .await
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|(_, d)| d.clone())
            .collect()
    }

    pub async fn awards(&self, user_id: &str) -> Vec<PointsAward> {
        self.awards
            .read()
            .await
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|(_, a)| a.clone())
            .collect()
    }

    /// Owner recorded with a stored transcript session.
    pub async fn transcript_owner(&self, session_id: &str) -> Option<(String, Option<String>)> {
        self.transcripts
            .read()
            .await
            .get(session_id)
            .map(|t| (t.site_id.clone(), t.user_id.clone()))
    }
}

#[async_trait]
impl SiteRepository for MemorySiteStore {
    async fn upsert_site(&self, site: &SiteRecord) -> Result<(), StoreError> {
        let mut sites = self.sites.write().await;
        match sites.get_mut(&site.site_id) {
            Some(existing) => {
                let components = std::mem::take(&mut existing.components);
                let created_at = existing.created_at;
                *existing = site.clone();
                existing.created_at = created_at;
                existing.updated_at = Utc::now();
                for component in components {
                    if existing.component(&component.name).is_none() {
                        existing.components.push(component);
                    }
                }
            }
            None => {
                sites.insert(site.site_id.clone(), site.clone());
            }
        }
        Ok(())
    }

    async fn get_site(&self, site_id: &str) -> Result<Option<SiteRecord>, StoreError> {
        Ok(self.sites.read().await.get(site_id).cloned())
    }

    async fn attach_components(
        &self,
        site_id: &str,
        components: &[SiteComponent],
    ) -> Result<(), StoreError> {
        let mut sites = self.sites.write().await;
        let site = sites
            .get_mut(site_id)
            .ok_or_else(|| StoreError::SiteNotFound(site_id.to_string()))?;

        for component in components {
            match site.components.iter_mut().find(|c| c.name == component.name) {
                Some(existing) => *existing = component.clone(),
                None => site.components.push(component.clone()),
            }
        }
        site.updated_at = Utc::now();
        Ok(())
    }

    async fn set_approval_status(&self, site_id: &str, approved: bool) -> Result<(), StoreError> {
        let mut sites = self.sites.write().await;
        let site = sites
            .get_mut(site_id)
            .ok_or_else(|| StoreError::SiteNotFound(site_id.to_string()))?;
        site.is_possible_archaeological_site = approved;
        site.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(&self, site_id: &str, status: SiteStatus) -> Result<(), StoreError> {
        let mut sites = self.sites.write().await;
        let site = sites
            .get_mut(site_id)
            .ok_or_else(|| StoreError::SiteNotFound(site_id.to_string()))?;
        site.status = status;
        site.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl GraphStore for MemorySiteStore {
    async fn upsert_node(&self, node: &GraphNode) -> Result<(), StoreError> {
        self.nodes
            .write()
            .await
            .insert((node.label.clone(), node.key.clone()), node.clone());
        Ok(())
    }

    async fn upsert_relationship(
        &self,
        relationship: &GraphRelationship,
    ) -> Result<(), StoreError> {
        // Site records double as graph nodes.
        let from_exists = relationship.from_label == SITE_LABEL
            && self
                .sites
                .read()
                .await
                .contains_key(&relationship.from_key);

        let nodes = self.nodes.read().await;
        for (label, key, is_site) in [
            (&relationship.from_label, &relationship.from_key, from_exists),
            (&relationship.to_label, &relationship.to_key, false),
        ] {
            if !is_site && !nodes.contains_key(&(label.clone(), key.clone())) {
                return Err(StoreError::NodeNotFound {
                    label: label.clone(),
                    key: key.clone(),
                });
            }
        }
        drop(nodes);

        self.relationships
            .write()
            .await
            .insert(relationship.clone());
        Ok(())
    }
}

#[async_trait]
impl TranscriptStore for MemorySiteStore {
    async fn save_transcript(
        &self,
        session_id: &str,
        site_id: &str,
        user_id: Option<&str>,
        transcript: &Transcript,
    ) -> Result<(), StoreError> {
        self.transcripts.write().await.insert(
            session_id.to_string(),
            StoredTranscript {
                site_id: site_id.to_string(),
                user_id: user_id.map(String::from),
                transcript: transcript.clone(),
            },
        );
        Ok(())
    }

    async fn get_transcript(&self, session_id: &str) -> Result<Option<Transcript>, StoreError> {
        Ok(self
            .transcripts
            .read()
            .await
            .get(session_id)
            .map(|t| t.transcript.clone()))
    }
}

#[async_trait]
impl Leaderboard for MemorySiteStore {
    async fn add_discovery(
        &self,
        user_id: &str,
        discovery: &Discovery,
    ) -> Result<(), StoreError> {
        self.discoveries.write().await.insert(
            (user_id.to_string(), discovery.site_id.clone()),
            discovery.clone(),
        );
        Ok(())
    }

    async fn award_points(&self, user_id: &str, award: &PointsAward) -> Result<(), StoreError> {
        self.awards
            .write()
            .await
            .insert((user_id.to_string(), award.key.clone()), award.clone());
        Ok(())
    }

    async fn total_points(&self, user_id: &str) -> Result<u64, StoreError> {
        let discovered: u64 = self
            .discoveries(user_id)
            .await
            .iter()
            .map(|d| u64::from(d.points_awarded))
            .sum();
        let awarded: u64 = self
            .awards(user_id)
            .await
            .iter()
            .map(|a| u64::from(a.points))
            .sum();
        Ok(discovered + awarded)
    }
}
