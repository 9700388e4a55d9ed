use log::error;
use openssl::ssl::{SslConnector, SslMethod};
use postgres_openssl::MakeTlsConnector;
use tokio::time::Duration;
use tokio_postgres::{Client, NoTls};
use url::Url;

const MAX_RETRIES: usize = 5;
const WAIT_BETWEEN_RETRIES: u64 = 5;

pub fn create_ssl_connector(sslrootcert_path: &str) -> Result<MakeTlsConnector, String> {
    let mut builder =
        SslConnector::builder(SslMethod::tls()).map_err(|e| format!("SSL builder error: {}", e))?;

    builder
        .set_ca_file(sslrootcert_path)
        .map_err(|e| format!("Error loading CA cert: {}", e))?;

    Ok(MakeTlsConnector::new(builder.build()))
}

/// Split the `sslrootcert` query parameter out of a database URL
///
/// tokio-postgres does not understand `sslrootcert`, so it is removed from
/// the URL handed to the driver and returned separately.
pub fn split_sslrootcert(database_url: &str) -> Result<(String, Option<String>), String> {
    let url = Url::parse(database_url).map_err(|e| format!("URL parse error: {}", e))?;

    let mut sslrootcert_path = None;
    let mut clean_params = Vec::new();
    for (key, value) in url.query_pairs() {
        if key == "sslrootcert" {
            sslrootcert_path = Some(value.to_string());
        } else {
            clean_params.push((key.into_owned(), value.into_owned()));
        }
    }

    let mut clean_url = url.clone();
    clean_url.set_query(None);
    if !clean_params.is_empty() {
        let query = clean_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        clean_url.set_query(Some(&query));
    }

    Ok((clean_url.to_string(), sslrootcert_path))
}

/// Connect with TLS when a root certificate is given, plain otherwise
async fn connect(clean_database_url: &str, sslrootcert: Option<&str>) -> Result<Client, String> {
    match sslrootcert {
        Some(path) => {
            let connector = create_ssl_connector(path)?;
            let (client, connection) = tokio_postgres::connect(clean_database_url, connector)
                .await
                .map_err(|e| format!("Connection error: {}", e))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("Connection error: {}", e);
                }
            });
            Ok(client)
        }
        None => {
            let (client, connection) = tokio_postgres::connect(clean_database_url, NoTls)
                .await
                .map_err(|e| format!("Connection error: {}", e))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("Connection error: {}", e);
                }
            });
            Ok(client)
        }
    }
}

pub async fn execute_with_retry<F, Fut>(database_url: &str, operation: F) -> Result<(), String>
where
    F: Fn(Client) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<u64, tokio_postgres::Error>> + Send,
{
    // A malformed URL will not get better by retrying
    let (clean_database_url, sslrootcert) = split_sslrootcert(database_url)?;

    for attempt in 0..MAX_RETRIES {
        match connect(&clean_database_url, sslrootcert.as_deref()).await {
            Ok(client) => match operation(client).await {
                Ok(_) => return Ok(()),
                Err(e) => error!("Attempt {}: query error: {}", attempt + 1, e),
            },
            Err(e) => error!("Attempt {}: {}", attempt + 1, e),
        }

        if attempt < MAX_RETRIES - 1 {
            tokio::time::sleep(Duration::from_secs(WAIT_BETWEEN_RETRIES)).await;
        }
    }

    Err("Max retries exceeded".into())
}
