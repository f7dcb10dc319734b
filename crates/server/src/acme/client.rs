//! `instant-acme` backed issuance client.

use async_trait::async_trait;
use chrono::Utc;
use instant_acme::{
    Account, AccountCredentials, HttpClient, Identifier, NewAccount, NewOrder, Order,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use macen_config::AccountConfig;

use super::account::{AccountStore, StoredAccount};
use super::error::{ProtocolError, StorageError};
use super::http::{HintingHttpClient, RetryHints};
use super::{
    AcmeOrder, AcmeService, Authorization, AuthorizationStatus, Challenge, ChallengeKind,
    ChallengeStatus, OrderSnapshot, OrderStatus,
};
use crate::types::DomainSet;

/// Issuance service client for one account.
///
/// The registered account is shared read-only by all orders. It is only
/// replaced under the write lock: once at startup, or after
/// [`AcmeService::invalidate_account`].
pub struct AcmeClient {
    config: AccountConfig,
    store: AccountStore,
    account: RwLock<Option<Account>>,
    hints: RetryHints,
}

impl AcmeClient {
    /// Create a client; the account directory is created if missing.
    pub fn new(config: AccountConfig) -> Result<Self, StorageError> {
        let store = AccountStore::new(&config.dir)?;
        Ok(Self {
            config,
            store,
            account: RwLock::new(None),
            hints: RetryHints::default(),
        })
    }

    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    async fn current_account(&self) -> Result<Account, ProtocolError> {
        self.ensure_account().await?;
        self.account
            .read()
            .await
            .clone()
            .ok_or_else(|| ProtocolError::transport("account", "account was invalidated concurrently"))
    }

    fn transport(&self, operation: &'static str) -> Result<Box<dyn HttpClient>, ProtocolError> {
        let client = HintingHttpClient::new(self.hints.clone())
            .map_err(|e| ProtocolError::transport(operation, e.to_string()))?;
        Ok(Box::new(client))
    }

    async fn load_or_register(&self) -> Result<Account, ProtocolError> {
        let stored = self
            .store
            .load_credentials_json()
            .map_err(|e| ProtocolError::transport("load account", e.to_string()))?;

        if let Some(json) = stored {
            match serde_json::from_str::<AccountCredentials>(&json) {
                Ok(credentials) => {
                    debug!(directory = %self.config.acme_server, "Restoring account from saved credentials");
                    return Account::from_credentials_and_http(credentials, self.transport("restore account")?)
                        .await
                        .map_err(map_acme_error("restore account"));
                }
                Err(e) => {
                    warn!(error = %e, "Stored account credentials are unreadable, registering a new account");
                }
            }
        }

        self.register().await
    }

    async fn register(&self) -> Result<Account, ProtocolError> {
        info!(
            directory = %self.config.acme_server,
            accept_terms_of_service = self.config.accept_terms_of_service,
            "Registering new account"
        );

        let new_account = NewAccount {
            contact: &[],
            terms_of_service_agreed: self.config.accept_terms_of_service,
            only_return_existing: false,
        };

        let (account, credentials) = Account::create_with_http(
            &new_account,
            &self.config.acme_server,
            None,
            self.transport("register account")?,
        )
        .await
            .map_err(map_acme_error("register account"))?;

        let json = serde_json::to_string_pretty(&credentials)
            .map_err(|e| ProtocolError::transport("register account", e.to_string()))?;
        let persist = |e: StorageError| ProtocolError::transport("save account", e.to_string());
        self.store.save_credentials_json(&json).map_err(persist)?;
        self.store
            .save_account(&StoredAccount {
                account_url: account.id().to_string(),
                directory: self.config.acme_server.clone(),
                created: Utc::now(),
            })
            .map_err(persist)?;

        info!(account_url = %account.id(), "Account registered");
        Ok(account)
    }
}

#[async_trait]
impl AcmeService for AcmeClient {
    async fn ensure_account(&self) -> Result<(), ProtocolError> {
        if self.account.read().await.is_some() {
            return Ok(());
        }

        let mut slot = self.account.write().await;
        // Another caller may have registered while we waited for the lock
        if slot.is_none() {
            *slot = Some(self.load_or_register().await?);
        }
        Ok(())
    }

    async fn invalidate_account(&self) {
        if self.account.write().await.take().is_some() {
            warn!("Account invalidated, it will be restored or re-registered on next use");
        }
    }

    async fn new_order(&self, domains: &DomainSet) -> Result<Box<dyn AcmeOrder>, ProtocolError> {
        let account = self.current_account().await?;
        let identifiers: Vec<Identifier> = domains
            .iter()
            .map(|d| Identifier::Dns(d.to_string()))
            .collect();

        let mut order = account
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await
            .map_err(map_acme_error("new order"))?;

        let url = order.url().to_string();
        let authorization_urls = order.state().authorizations.clone();
        debug!(domains = %domains, order_url = %url, "Created order");
        Ok(Box::new(InstantOrder {
            order,
            url,
            authorization_urls,
            hints: self.hints.clone(),
        }))
    }
}

impl std::fmt::Debug for AcmeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcmeClient")
            .field("directory", &self.config.acme_server)
            .field("account_dir", &self.store.base_path())
            .finish()
    }
}

struct InstantOrder {
    order: Order,
    url: String,
    authorization_urls: Vec<String>,
    hints: RetryHints,
}

impl Drop for InstantOrder {
    fn drop(&mut self) {
        self.hints.forget(&self.url);
        for url in &self.authorization_urls {
            self.hints.forget(url);
        }
    }
}

#[async_trait]
impl AcmeOrder for InstantOrder {
    fn url(&self) -> &str {
        &self.url
    }

    async fn authorizations(&mut self) -> Result<Vec<Authorization>, ProtocolError> {
        let authorizations = self
            .order
            .authorizations()
            .await
            .map_err(map_acme_error("fetch authorizations"))?;

        let mut converted = Vec::with_capacity(authorizations.len());
        // Authorizations come back in the order of their URLs
        for (index, authz) in authorizations.iter().enumerate() {
            #[allow(irrefutable_let_patterns)]
            let domain = if let Identifier::Dns(domain) = &authz.identifier {
                domain.clone()
            } else {
                continue;
            };

            let challenges = authz
                .challenges
                .iter()
                .filter_map(|c| {
                    let kind = match c.r#type {
                        instant_acme::ChallengeType::Http01 => ChallengeKind::Http01,
                        instant_acme::ChallengeType::Dns01 => ChallengeKind::Dns01,
                        _ => return None,
                    };
                    Some(Challenge {
                        kind,
                        url: c.url.clone(),
                        token: c.token.clone(),
                        key_authorization: self.order.key_authorization(c).as_str().to_string(),
                        status: convert_challenge_status(&c.status),
                    })
                })
                .collect();

            let error = authz
                .challenges
                .iter()
                .find_map(|c| c.error.as_ref())
                .map(|p| p.detail.clone().unwrap_or_else(|| format!("{p:?}")));

            converted.push(Authorization {
                domain,
                status: convert_authorization_status(&authz.status),
                challenges,
                error,
                retry_after: self
                    .authorization_urls
                    .get(index)
                    .and_then(|url| self.hints.get(url)),
            });
        }

        Ok(converted)
    }

    async fn set_challenge_ready(&mut self, challenge: &Challenge) -> Result<(), ProtocolError> {
        self.order
            .set_challenge_ready(&challenge.url)
            .await
            .map_err(map_acme_error("challenge ready"))
    }

    async fn refresh(&mut self) -> Result<OrderSnapshot, ProtocolError> {
        let state = self
            .order
            .refresh()
            .await
            .map_err(map_acme_error("refresh order"))?;

        Ok(OrderSnapshot {
            status: convert_order_status(&state.status),
            retry_after: self.hints.get(&self.url),
            error: state
                .error
                .as_ref()
                .map(|p| p.detail.clone().unwrap_or_else(|| format!("{p:?}"))),
        })
    }

    async fn finalize(&mut self, csr_der: &[u8]) -> Result<(), ProtocolError> {
        self.order
            .finalize(csr_der)
            .await
            .map_err(map_acme_error("finalize"))
    }

    async fn certificate(&mut self) -> Result<Option<String>, ProtocolError> {
        self.order
            .certificate()
            .await
            .map_err(map_acme_error("download certificate"))
    }
}

fn map_acme_error(operation: &'static str) -> impl FnOnce(instant_acme::Error) -> ProtocolError {
    move |err| match err {
        instant_acme::Error::Api(problem) => ProtocolError::from_problem(
            operation,
            problem.r#type.as_deref(),
            problem.detail.as_deref().unwrap_or("no detail given"),
        ),
        other => ProtocolError::transport(operation, other.to_string()),
    }
}

#[allow(unreachable_patterns)]
fn convert_order_status(status: &instant_acme::OrderStatus) -> OrderStatus {
    match status {
        instant_acme::OrderStatus::Pending => OrderStatus::Pending,
        instant_acme::OrderStatus::Ready => OrderStatus::Ready,
        instant_acme::OrderStatus::Processing => OrderStatus::Processing,
        instant_acme::OrderStatus::Valid => OrderStatus::Valid,
        _ => OrderStatus::Invalid,
    }
}

#[allow(unreachable_patterns)]
fn convert_authorization_status(status: &instant_acme::AuthorizationStatus) -> AuthorizationStatus {
    match status {
        instant_acme::AuthorizationStatus::Pending => AuthorizationStatus::Pending,
        instant_acme::AuthorizationStatus::Valid => AuthorizationStatus::Valid,
        instant_acme::AuthorizationStatus::Expired => AuthorizationStatus::Expired,
        // Revoked and deactivated authorizations can never become valid again
        _ => AuthorizationStatus::Invalid,
    }
}

#[allow(unreachable_patterns)]
fn convert_challenge_status(status: &instant_acme::ChallengeStatus) -> ChallengeStatus {
    match status {
        instant_acme::ChallengeStatus::Pending => ChallengeStatus::Pending,
        instant_acme::ChallengeStatus::Processing => ChallengeStatus::Processing,
        instant_acme::ChallengeStatus::Valid => ChallengeStatus::Valid,
        _ => ChallengeStatus::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_client_creates_account_dir() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("acct");
        let client = AcmeClient::new(AccountConfig {
            dir: dir.clone(),
            acme_server: "https://acme.invalid/directory".into(),
            accept_terms_of_service: true,
        })
        .unwrap();
        assert!(dir.is_dir());
        assert_eq!(client.config().acme_server, "https://acme.invalid/directory");
    }

    #[test]
    fn test_status_conversion() {
        assert_eq!(
            convert_authorization_status(&instant_acme::AuthorizationStatus::Revoked),
            AuthorizationStatus::Invalid
        );
        assert_eq!(
            convert_order_status(&instant_acme::OrderStatus::Ready),
            OrderStatus::Ready
        );
    }
}
