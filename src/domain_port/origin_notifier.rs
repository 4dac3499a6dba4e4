use crate::domain_model::OriginChange;

#[async_trait::async_trait]
pub trait OriginChangeNotifier: Send + Sync {
    async fn notify_origin_change(&self, event: &OriginChange) -> anyhow::Result<()>;
}
