//! Initialise the Elasticsearch index backend.
use std::sync::Arc;

use anyhow::Context as AnyContext;
use anyhow::Result;
use serde_json::Value as Json;

use breakglass_context::Context;
use breakglass_index::IndexBackend;
use breakglass_index::IndexFactory;
use breakglass_index::IndexFactoryArgs;
use breakglass_index::IndexFactorySyncArgs;

use crate::Conf;
use crate::ConfError;
use crate::Elasticsearch;

/// Initialise the Elasticsearch index backend.
pub struct ElasticsearchFactory;

#[async_trait::async_trait]
impl IndexFactory for ElasticsearchFactory {
    fn conf_check(&self, _: &Context, conf: &Json) -> Result<()> {
        serde_json::from_value::<Conf>(conf.clone()).context(ConfError)?;
        Ok(())
    }

    fn register_metrics(&self, registry: &prometheus::Registry) -> Result<()> {
        crate::telemetry::register_metrics(registry)
    }

    async fn backend<'a>(&self, args: IndexFactoryArgs<'a>) -> Result<Arc<dyn IndexBackend>> {
        let conf: Conf = serde_json::from_value(args.conf.clone()).context(ConfError)?;
        let backend = Elasticsearch::new(conf)?;
        Ok(Arc::new(backend))
    }

    async fn sync<'a>(&self, args: IndexFactorySyncArgs<'a>) -> Result<()> {
        let conf: Conf = serde_json::from_value(args.conf.clone()).context(ConfError)?;
        let backend = Elasticsearch::new(conf)?;
        for index in args.indices {
            backend
                .create_index(args.context, args.credential, index)
                .await?;
        }
        Ok(())
    }
}
