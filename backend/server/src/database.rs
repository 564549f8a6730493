//! # Redis
//!
//! Document store of the storefront.
//!
//! ## Requirements
//!
//! - Fast lookups by id, by email and by the one-time tokens sent in emails
//! - Small dataset: a catalog of a few hundred bikes and parts, a few thousand customers
//! - Unique customer and admin emails, even under concurrent registrations
//! - Counters for the auth rate limiter
//!
//! ## Implementation
//!
//! - One Redis hash per collection: record id → JSON document
//! - Secondary indexes are hashes too: email/token → record id
//! - New customers and admins go through one Lua script: the email index is checked, then the
//!   document, its token indexes and finally the email index are written, all or nothing
//! - Token indexes are never cleaned up eagerly, a lookup only counts when the document still
//!   carries the token
//! - Rate limiter: `SET NX EX` opens a window on `ratelimit:<route>:<ip>`, then `INCR`, in one
//!   `MULTI`
use std::{sync::LazyLock, time::Duration};

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client, RedisError, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::info;
use uuid::Uuid;

use crate::{
    models::{Customer, Order, Product, User},
    store::{Store, StoreResult},
};

pub const PRODUCTS: &str = "products";
pub const CUSTOMERS: &str = "customers";
pub const CUSTOMER_EMAILS: &str = "customers:email";
pub const CUSTOMER_VERIFY_TOKENS: &str = "customers:verify";
pub const CUSTOMER_UNSUBSCRIBE_TOKENS: &str = "customers:unsubscribe";
pub const USERS: &str = "users";
pub const USER_EMAILS: &str = "users:email";
pub const ORDERS: &str = "orders";
pub const RATE_LIMIT_PREFIX: &str = "ratelimit:";

/// KEYS: email index, document hash, then token indexes.
/// ARGV: email, id, document, then one token per token index.
static INSERT_UNIQUE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[2], ARGV[2], ARGV[3])
for i = 3, #KEYS do
    redis.call('HSET', KEYS[i], ARGV[i + 1], ARGV[2])
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
return 1
"#,
    )
});

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, RedisError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(500));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    info!("Connected to Redis");

    Ok(connection_manager)
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, RedisError> {
        Ok(Self::new(init_redis(redis_url).await?))
    }

    async fn get_json<T: DeserializeOwned>(&self, hash: &str, field: &str) -> StoreResult<Option<T>> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.hget(hash, field).await?;

        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    async fn set_json<T: Serialize>(&self, hash: &str, field: &str, value: &T) -> StoreResult<()> {
        let mut connection = self.connection.clone();
        let _: () = connection
            .hset(hash, field, serde_json::to_string(value)?)
            .await?;

        Ok(())
    }

    async fn all_json<T: DeserializeOwned>(&self, hash: &str) -> StoreResult<Vec<T>> {
        let mut connection = self.connection.clone();
        let raw: Vec<String> = connection.hvals(hash).await?;

        Ok(raw
            .iter()
            .map(|raw| serde_json::from_str(raw))
            .collect::<Result<_, _>>()?)
    }

    /// Resolves `key` through `index` to a document of `hash`.
    async fn indexed<T: DeserializeOwned>(
        &self,
        index: &str,
        key: &str,
        hash: &str,
    ) -> StoreResult<Option<T>> {
        let mut connection = self.connection.clone();
        let id: Option<String> = connection.hget(index, key).await?;

        match id {
            Some(id) => self.get_json(hash, &id).await,
            None => Ok(None),
        }
    }

    /// Writes a document under a unique email. Nothing is written when the email is taken.
    async fn insert_unique<T: Serialize>(
        &self,
        email_index: &str,
        email: &str,
        hash: &str,
        id: Uuid,
        document: &T,
        tokens: &[(&str, &str)],
    ) -> StoreResult<bool> {
        let mut invocation = INSERT_UNIQUE.prepare_invoke();
        invocation
            .key(email_index)
            .key(hash)
            .arg(email)
            .arg(id.to_string())
            .arg(serde_json::to_string(document)?);

        for (index, token) in tokens {
            invocation.key(*index).arg(*token);
        }

        let mut connection = self.connection.clone();
        let inserted: u8 = invocation.invoke_async(&mut connection).await?;

        Ok(inserted == 1)
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn ping(&self) -> StoreResult<()> {
        let mut connection = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;

        Ok(())
    }

    async fn put_product(&self, product: &Product) -> StoreResult<()> {
        self.set_json(PRODUCTS, &product.id.to_string(), product).await
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        self.get_json(PRODUCTS, &id.to_string()).await
    }

    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        self.all_json(PRODUCTS).await
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<bool> {
        let mut connection = self.connection.clone();
        let removed: u64 = connection.hdel(PRODUCTS, id.to_string()).await?;

        Ok(removed > 0)
    }

    async fn insert_customer(&self, customer: &Customer) -> StoreResult<bool> {
        let mut tokens = vec![(CUSTOMER_UNSUBSCRIBE_TOKENS, customer.unsubscribe_token.as_str())];
        if let Some(token) = &customer.verify_token {
            tokens.push((CUSTOMER_VERIFY_TOKENS, token.as_str()));
        }

        self.insert_unique(
            CUSTOMER_EMAILS,
            &customer.email,
            CUSTOMERS,
            customer.id,
            customer,
            &tokens,
        )
        .await
    }

    async fn save_customer(&self, customer: &Customer) -> StoreResult<()> {
        let id = customer.id.to_string();
        let mut pipe = redis::pipe();

        pipe.atomic()
            .hset(CUSTOMERS, &id, serde_json::to_string(customer)?)
            .ignore()
            .hset(CUSTOMER_UNSUBSCRIBE_TOKENS, &customer.unsubscribe_token, &id)
            .ignore();

        if let Some(token) = &customer.verify_token {
            pipe.hset(CUSTOMER_VERIFY_TOKENS, token, &id).ignore();
        }

        let mut connection = self.connection.clone();
        let _: () = pipe.query_async(&mut connection).await?;

        Ok(())
    }

    async fn get_customer(&self, id: Uuid) -> StoreResult<Option<Customer>> {
        self.get_json(CUSTOMERS, &id.to_string()).await
    }

    async fn customer_by_email(&self, email: &str) -> StoreResult<Option<Customer>> {
        self.indexed(CUSTOMER_EMAILS, email, CUSTOMERS).await
    }

    async fn customer_by_verify_token(&self, token: &str) -> StoreResult<Option<Customer>> {
        let customer: Option<Customer> =
            self.indexed(CUSTOMER_VERIFY_TOKENS, token, CUSTOMERS).await?;

        Ok(customer.filter(|c| c.verify_token.as_deref() == Some(token)))
    }

    async fn customer_by_unsubscribe_token(&self, token: &str) -> StoreResult<Option<Customer>> {
        let customer: Option<Customer> =
            self.indexed(CUSTOMER_UNSUBSCRIBE_TOKENS, token, CUSTOMERS).await?;

        Ok(customer.filter(|c| c.unsubscribe_token == token))
    }

    async fn insert_user(&self, user: &User) -> StoreResult<bool> {
        self.insert_unique(USER_EMAILS, &user.email, USERS, user.id, user, &[])
            .await
    }

    async fn save_user(&self, user: &User) -> StoreResult<()> {
        self.set_json(USERS, &user.id.to_string(), user).await
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.get_json(USERS, &id.to_string()).await
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.indexed(USER_EMAILS, email, USERS).await
    }

    async fn save_order(&self, order: &Order) -> StoreResult<()> {
        self.set_json(ORDERS, &order.id.to_string(), order).await
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        self.get_json(ORDERS, &id.to_string()).await
    }

    async fn hit(&self, key: &str, window: Duration) -> StoreResult<u64> {
        let key = format!("{RATE_LIMIT_PREFIX}{key}");
        let mut connection = self.connection.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(&key)
            .arg(0)
            .arg("EX")
            .arg(window.as_secs().max(1))
            .arg("NX")
            .ignore()
            .incr(&key, 1);

        let (hits,): (u64,) = pipe.query_async(&mut connection).await?;

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    async fn store() -> RedisStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        RedisStore::connect(&url).await.unwrap()
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn test_insert_user_is_all_or_nothing() {
        let store = store().await;
        let mut connection = store.connection.clone();
        let email = format!("{}@test.local", Uuid::new_v4());
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.clone(),
            password_hash: String::new(),
            confirmed: false,
            created_at: now,
            updated_at: now,
        };

        assert!(store.insert_user(&user).await.unwrap());
        assert_eq!(store.user_by_email(&email).await.unwrap().map(|u| u.id), Some(user.id));

        let duplicate = User { id: Uuid::new_v4(), ..user.clone() };
        assert!(!store.insert_user(&duplicate).await.unwrap());
        assert!(store.get_user(duplicate.id).await.unwrap().is_none());

        // A failing document write leaves the email free.
        let broken = format!("{}:broken", Uuid::new_v4());
        let _: () = connection.set(&broken, "not a hash").await.unwrap();
        let other = format!("{}@test.local", Uuid::new_v4());
        let result = store
            .insert_unique(USER_EMAILS, &other, &broken, Uuid::new_v4(), &user, &[])
            .await;
        assert!(result.is_err());
        let claimed: Option<String> = connection.hget(USER_EMAILS, &other).await.unwrap();
        assert!(claimed.is_none());

        let _: () = connection.del(&broken).await.unwrap();
        let _: () = connection.hdel(USER_EMAILS, &email).await.unwrap();
        let _: () = connection.hdel(USERS, user.id.to_string()).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn test_hit_window_always_expires() {
        let store = store().await;
        let mut connection = store.connection.clone();
        let key = format!("test:{}", Uuid::new_v4());
        let window = Duration::from_secs(60);

        assert_eq!(store.hit(&key, window).await.unwrap(), 1);
        assert_eq!(store.hit(&key, window).await.unwrap(), 2);

        let ttl: i64 = connection.ttl(format!("{RATE_LIMIT_PREFIX}{key}")).await.unwrap();
        assert!(ttl > 0 && ttl <= 60);

        let _: () = connection.del(format!("{RATE_LIMIT_PREFIX}{key}")).await.unwrap();
    }
}
