use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use chatkeep_db::models::UserRow;
use chatkeep_db::{Database, DbError};
use chatkeep_types::api::{LoginRequest, RegisterRequest, UpdateUserRequest};
use chatkeep_types::models::User;

use crate::guard::{Access, authorize};
use crate::password::{CredentialHasher, HashError};
use crate::token::{TokenError, TokenService};

const MIN_USERNAME_CHARS: usize = 3;
const MAX_USERNAME_CHARS: usize = 50;
const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    Invalid(String),

    #[error("email already exists")]
    EmailTaken,

    #[error("username already exists")]
    UsernameTaken,

    /// Returned for both an unknown email and a wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user not found")]
    NotFound,

    #[error("access denied")]
    Forbidden,

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(DbError),
}

impl From<DbError> for AccountError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::UniqueViolation(ref column) if column == "email" => AccountError::EmailTaken,
            DbError::UniqueViolation(ref column) if column == "username" => {
                AccountError::UsernameTaken
            }
            other => AccountError::Store(other),
        }
    }
}

pub type AccountResult<T> = Result<T, AccountError>;

/// A freshly authenticated user together with their bearer token.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Clone)]
pub struct AccountService {
    db: Arc<Database>,
    hasher: CredentialHasher,
    tokens: TokenService,
}

impl AccountService {
    pub fn new(db: Arc<Database>, hasher: CredentialHasher, tokens: TokenService) -> Self {
        Self { db, hasher, tokens }
    }

    pub fn register(&self, req: &RegisterRequest) -> AccountResult<Session> {
        validate_email(&req.email)?;
        validate_username(&req.username)?;
        if req.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AccountError::Invalid(format!(
                "password must be at least {MIN_PASSWORD_CHARS} characters"
            )));
        }
        require_non_empty("first_name", &req.first_name)?;
        require_non_empty("last_name", &req.last_name)?;

        if self.db.email_exists(&req.email)? {
            return Err(AccountError::EmailTaken);
        }
        if self.db.username_exists(&req.username)? {
            return Err(AccountError::UsernameTaken);
        }

        let password_hash = self.hasher.hash(&req.password)?;
        let now = chatkeep_db::now();
        let row = UserRow {
            id: Uuid::new_v4(),
            email: req.email.clone(),
            username: req.username.clone(),
            password_hash,
            first_name: req.first_name.clone(),
            last_name: req.last_name.clone(),
            created_at: now,
            updated_at: now,
        };

        // A concurrent registration can still win the race; the unique
        // constraints turn that into EmailTaken/UsernameTaken via From<DbError>.
        self.db.insert_user(&row)?;

        let user = User::from(row);
        info!("Registered user {} ({})", user.username, user.id);
        let token = self.tokens.issue(&user)?;
        Ok(Session { token, user })
    }

    pub fn login(&self, req: &LoginRequest) -> AccountResult<Session> {
        let Some(row) = self.db.get_user_by_email(&req.email)? else {
            // Unknown emails cost the same Argon2 work as a wrong password.
            self.hasher.verify_absent(&req.password);
            debug!("Login failed: unknown email");
            return Err(AccountError::InvalidCredentials);
        };

        if !self.hasher.verify(&req.password, &row.password_hash) {
            debug!("Login failed for user {}", row.id);
            return Err(AccountError::InvalidCredentials);
        }

        let user = User::from(row);
        let token = self.tokens.issue(&user)?;
        Ok(Session { token, user })
    }

    pub fn get_user(&self, id: Uuid) -> AccountResult<User> {
        self.db
            .get_user_by_id(id)?
            .map(User::from)
            .ok_or(AccountError::NotFound)
    }

    /// Apply a partial profile update. Only the account owner may do this.
    pub fn update_user(
        &self,
        requester_id: Uuid,
        id: Uuid,
        patch: &UpdateUserRequest,
    ) -> AccountResult<User> {
        if authorize(requester_id, id) == Access::Forbidden {
            return Err(AccountError::Forbidden);
        }
        let mut row = self.db.get_user_by_id(id)?.ok_or(AccountError::NotFound)?;

        if let Some(email) = patch.email.as_ref().filter(|e| **e != row.email) {
            validate_email(email)?;
            if self.db.email_exists(email)? {
                return Err(AccountError::EmailTaken);
            }
            row.email = email.clone();
        }
        if let Some(username) = patch.username.as_ref().filter(|u| **u != row.username) {
            validate_username(username)?;
            if self.db.username_exists(username)? {
                return Err(AccountError::UsernameTaken);
            }
            row.username = username.clone();
        }
        if let Some(first_name) = &patch.first_name {
            require_non_empty("first_name", first_name)?;
            row.first_name = first_name.clone();
        }
        if let Some(last_name) = &patch.last_name {
            require_non_empty("last_name", last_name)?;
            row.last_name = last_name.clone();
        }
        row.updated_at = chatkeep_db::now();

        if !self.db.update_user(&row)? {
            return Err(AccountError::NotFound);
        }
        Ok(User::from(row))
    }

    /// Delete an account along with all of its conversations.
    pub fn delete_user(&self, requester_id: Uuid, id: Uuid) -> AccountResult<()> {
        if authorize(requester_id, id) == Access::Forbidden {
            return Err(AccountError::Forbidden);
        }
        if !self.db.delete_user(id)? {
            return Err(AccountError::NotFound);
        }
        info!("Deleted user {}", id);
        Ok(())
    }
}

fn validate_email(email: &str) -> AccountResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AccountError::Invalid("email must be a valid email address".into()))
    }
}

fn validate_username(username: &str) -> AccountResult<()> {
    let len = username.chars().count();
    if (MIN_USERNAME_CHARS..=MAX_USERNAME_CHARS).contains(&len) {
        Ok(())
    } else {
        Err(AccountError::Invalid(format!(
            "username must be between {MIN_USERNAME_CHARS} and {MAX_USERNAME_CHARS} characters"
        )))
    }
}

fn require_non_empty(field: &str, value: &str) -> AccountResult<()> {
    if value.trim().is_empty() {
        Err(AccountError::Invalid(format!("{field} is required")))
    } else {
        Ok(())
    }
}
