use mongodb::{
    bson::{doc, Document},
    options::ClientOptions,
    Client, Collection,
};
use tracing::{debug, info};

use super::CountStore;
use crate::config::StoreConfig;
use crate::error::{EnrichError, Result, StoreError};

/// Name of the document field compared against the normalized address.
pub const ADDRESS_FIELD: &str = "address";

const APP_NAME: &str = "addrcount";

/// Session against one MongoDB collection.
pub struct MongoStore {
    client: Client,
    collection: Collection<Document>,
}

impl MongoStore {
    /// Parse the connection string, open a client and ping the server so an
    /// unreachable endpoint or bad credentials fail here rather than on the
    /// first row.
    #[tracing::instrument(level = "info", skip(config), fields(endpoint = %config.redacted_endpoint()))]
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let connection_error = |source: mongodb::error::Error| EnrichError::Connection {
            endpoint: config.redacted_endpoint(),
            source: StoreError::Mongo(source),
        };

        let mut options = ClientOptions::parse(&config.endpoint)
            .await
            .map_err(connection_error)?;
        options.app_name = Some(APP_NAME.to_string());
        let client = Client::with_options(options).map_err(connection_error)?;

        client
            .database(&config.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(connection_error)?;
        info!(
            database = %config.database,
            collection = %config.collection,
            "connected"
        );

        let collection = client
            .database(&config.database)
            .collection::<Document>(&config.collection);
        Ok(Self { client, collection })
    }

    /// Close pooled connections. Consumes the session.
    pub async fn shutdown(self) {
        debug!("disconnecting");
        self.client.shutdown().await;
    }
}

impl CountStore for MongoStore {
    async fn count(&self, address: &str) -> std::result::Result<u64, StoreError> {
        let mut filter = Document::new();
        filter.insert(ADDRESS_FIELD, address);
        Ok(self.collection.count_documents(filter).await?)
    }
}
