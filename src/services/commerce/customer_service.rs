use crate::{
    auth::{hash_password, verify_password, AuthService, RequestContext},
    common::{page_index, Page},
    config::PaymentMethodsConfig,
    entities::{user, PaymentMethod, ShippingAddress, User, UserModel, UserRole},
    errors::{Navigation, ServiceError},
    events::{Event, EventSender},
    services::commerce::cart_service::CartService,
};
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUpInput {
    #[validate(length(min = 3, message = "Name must be at least 3 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignInInput {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    #[validate(length(min = 3, message = "Name must be at least 3 characters"))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    #[validate(length(min = 3, message = "Name must be at least 3 characters"))]
    pub name: String,
    pub role: UserRole,
}

/// Accounts: registration, sign-in, saved checkout details and admin user management.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    auth_service: Arc<AuthService>,
    carts: Arc<CartService>,
    payment_methods: PaymentMethodsConfig,
    page_size: u64,
}

impl CustomerService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        auth_service: Arc<AuthService>,
        carts: Arc<CartService>,
        payment_methods: PaymentMethodsConfig,
        page_size: u64,
    ) -> Self {
        Self {
            db,
            event_sender,
            auth_service,
            carts,
            payment_methods,
            page_size,
        }
    }

    /// Registers an account and signs it in.
    #[instrument(skip(self, ctx, input))]
    pub async fn sign_up(
        &self,
        ctx: &RequestContext,
        input: SignUpInput,
    ) -> Result<Navigation, ServiceError> {
        input.validate()?;
        if input.password != input.confirm_password {
            return Err(ServiceError::ValidationError(
                "Passwords don't match".to_string(),
            ));
        }

        let now = Utc::now();
        let customer = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            email: Set(input.email.trim().to_string()),
            password_hash: Set(Some(hash_password(&input.password)?)),
            role: Set(UserRole::User),
            address: Set(None),
            payment_method: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_write(e, "email"))?;

        self.event_sender
            .send_or_log(Event::UserRegistered(customer.id))
            .await;
        info!("User registered: {}", customer.id);

        self.start_session(ctx, &customer, input.callback_url.as_deref())
            .await
    }

    /// Verifies credentials, issues the session token and adopts the session cart.
    #[instrument(skip(self, ctx, input))]
    pub async fn sign_in(
        &self,
        ctx: &RequestContext,
        input: SignInInput,
    ) -> Result<Navigation, ServiceError> {
        let invalid = || ServiceError::Unauthorized("Invalid email or password".to_string());
        input.validate().map_err(|_| invalid())?;

        let customer = User::find()
            .filter(user::Column::Email.eq(input.email.trim()))
            .one(&*self.db)
            .await?
            .ok_or_else(invalid)?;

        let verified = customer
            .password_hash
            .as_deref()
            .map(|hash| verify_password(hash, &input.password))
            .unwrap_or(false);
        if !verified {
            warn!(user_id = %customer.id, "failed sign-in attempt");
            return Err(invalid());
        }

        self.start_session(ctx, &customer, input.callback_url.as_deref())
            .await
    }

    /// Clears the auth cookie and returns to the home page.
    pub fn sign_out(&self) -> Navigation {
        Navigation::to("/").with_cookie(self.auth_service.clear_cookie())
    }

    async fn start_session(
        &self,
        ctx: &RequestContext,
        customer: &UserModel,
        callback_url: Option<&str>,
    ) -> Result<Navigation, ServiceError> {
        let token = self.auth_service.issue_token(customer)?;

        if let Some(session_id) = ctx.session_id.as_deref() {
            self.carts.merge_on_sign_in(session_id, customer.id).await?;
        }

        info!(user_id = %customer.id, "user signed in");
        Ok(Navigation::to(safe_callback(callback_url))
            .with_cookie(self.auth_service.session_cookie(&token)))
    }

    /// The caller's own account
    #[instrument(skip(self))]
    pub async fn get_profile(&self, ctx: &RequestContext) -> Result<UserModel, ServiceError> {
        let user_id = ctx.require_user()?.user_id;
        self.get_user(user_id).await
    }

    /// Saves the shipping address used at checkout.
    #[instrument(skip(self, address))]
    pub async fn update_address(
        &self,
        ctx: &RequestContext,
        address: ShippingAddress,
    ) -> Result<UserModel, ServiceError> {
        let user_id = ctx.require_user()?.user_id;
        address.validate()?;

        let mut active: user::ActiveModel = self.get_user(user_id).await?.into();
        active.address = Set(Some(address));
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Saves the preferred payment method; it must be one the store accepts.
    #[instrument(skip(self))]
    pub async fn update_payment_method(
        &self,
        ctx: &RequestContext,
        method: PaymentMethod,
    ) -> Result<UserModel, ServiceError> {
        let user_id = ctx.require_user()?.user_id;
        if !self.payment_methods.is_enabled(method) {
            return Err(ServiceError::ValidationError(
                "Invalid payment method".to_string(),
            ));
        }

        let mut active: user::ActiveModel = self.get_user(user_id).await?.into();
        active.payment_method = Set(Some(method));
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn update_profile(
        &self,
        ctx: &RequestContext,
        input: UpdateProfileInput,
    ) -> Result<UserModel, ServiceError> {
        let user_id = ctx.require_user()?.user_id;
        input.validate()?;

        let mut active: user::ActiveModel = self.get_user(user_id).await?.into();
        active.name = Set(input.name);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Admin: users newest first, optionally filtered by name.
    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        page: Option<u64>,
        query: Option<String>,
    ) -> Result<Page<UserModel>, ServiceError> {
        let mut select = User::find().order_by_desc(user::Column::CreatedAt);

        if let Some(q) = query.filter(|q| !q.trim().is_empty() && q != "all") {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(user::Column::Name)))
                    .like(format!("%{}%", q.to_lowercase())),
            );
        }

        let paginator = select.paginate(&*self.db, self.page_size);
        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page_index(page)).await?;
        Ok(Page::new(data, total, self.page_size))
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, id: Uuid) -> Result<UserModel, ServiceError> {
        User::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    /// Admin: rename a user or change their role.
    #[instrument(skip(self))]
    pub async fn update_user(
        &self,
        id: Uuid,
        input: UpdateUserInput,
    ) -> Result<UserModel, ServiceError> {
        input.validate()?;

        let mut active: user::ActiveModel = self.get_user(id).await?.into();
        active.name = Set(input.name);
        active.role = Set(input.role);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(user_id = %id, role = %updated.role, "user updated");
        Ok(updated)
    }

    /// Admin: delete a user together with their orders, reviews and cart.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.get_user(id).await?;
        existing.delete(&*self.db).await?;

        self.event_sender.send_or_log(Event::UserDeleted(id)).await;
        info!("User deleted: {}", id);
        Ok(())
    }

    pub async fn count_users(&self) -> Result<u64, ServiceError> {
        Ok(User::find().count(&*self.db).await?)
    }
}

/// Only same-site relative paths are followed after sign-in.
fn safe_callback(callback_url: Option<&str>) -> &str {
    match callback_url {
        Some(url) if url.starts_with('/') && !url.starts_with("//") => url,
        _ => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_must_be_relative() {
        assert_eq!(safe_callback(Some("/shipping-address")), "/shipping-address");
        assert_eq!(safe_callback(Some("https://evil.example")), "/");
        assert_eq!(safe_callback(Some("//evil.example")), "/");
        assert_eq!(safe_callback(None), "/");
    }

    #[test]
    fn sign_up_messages_are_joined() {
        let input = SignUpInput {
            name: "Jo".into(),
            email: "not-an-email".into(),
            password: "123".into(),
            confirm_password: "123".into(),
            callback_url: None,
        };
        let err = ServiceError::from(input.validate().unwrap_err());
        assert_eq!(
            err.to_string(),
            "Invalid email address. Name must be at least 3 characters. Password must be at least 6 characters"
        );
    }
}
