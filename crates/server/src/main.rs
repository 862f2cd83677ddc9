//! Test harness for the recommendation orchestrator.
//!
//! Loads a catalog from `data/` and walks one user through every
//! recommendation mode, printing the ranked lists.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use catalog::CatalogIndex;
use server::{RecRequest, RecType, Recommender, RecommenderConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info,server=debug,engines=debug,ranking=debug")
        .init();

    info!("loading catalog from data/");
    let catalog = Arc::new(CatalogIndex::load_from_files(Path::new("data"))?);
    let recommender = Recommender::new(catalog, RecommenderConfig::default());

    let user_id = 1;
    for rec_type in [RecType::Collaborative, RecType::Personalized, RecType::Hybrid] {
        let request = RecRequest {
            rec_type,
            user_id: Some(user_id),
            movie_id: None,
            count: 10,
        };
        let response = recommender.recommend_async(request).await?;
        info!(
            "{:?} for user {} ({:?}):",
            rec_type, user_id, response.status
        );
        for (i, item) in response.items.iter().enumerate() {
            info!("{:2}. {} - {:.3}", i + 1, item.title, item.score);
        }
    }

    Ok(())
}
