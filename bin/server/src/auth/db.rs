//! Postgres implementation of the identity and client certificate stores.

use async_trait::async_trait;
use portal_core::{AdminUserId, ClientCertId, OfficeUserId, RoleId, ServiceMemberId, UserId};
use portal_platform_access::{
    AdminUser, AdminUserStore, BranchAccess, ClientCert, ClientCertPermissions, ClientCertStore,
    OfficeUser, OfficeUserStore, Role, RoleType, StoreError, User, UserIdentity, UserStore,
};
use rootcause::prelude::Report;
use sqlx::{FromRow, PgPool};
use std::fmt::Display;
use std::str::FromStr;

fn query_error(e: sqlx::Error) -> StoreError {
    StoreError::Query {
        details: e.to_string(),
    }
}

fn parse_column<T>(column: &str, value: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e| StoreError::Decode {
        details: format!("invalid {column} '{value}': {e}"),
    })
}

fn parse_optional<T>(column: &str, value: Option<&str>) -> Result<Option<T>, StoreError>
where
    T: FromStr,
    T::Err: Display,
{
    value.map(|v| parse_column(column, v)).transpose()
}

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: String,
    login_gov_uuid: String,
    login_gov_email: String,
}

impl UserRow {
    fn try_into_user(self) -> Result<User, StoreError> {
        Ok(User::with_id(
            parse_column("user id", &self.id)?,
            self.login_gov_uuid,
            self.login_gov_email,
        ))
    }
}

/// Row type for office and admin user queries.
#[derive(FromRow)]
struct StaffRow {
    id: String,
    email: String,
    active: bool,
    user_id: Option<String>,
    first_name: String,
    last_name: String,
}

impl StaffRow {
    fn try_into_office_user(self) -> Result<OfficeUser, StoreError> {
        Ok(OfficeUser::new(
            parse_column::<OfficeUserId>("office user id", &self.id)?,
            self.email,
            self.active,
            parse_optional("user id", self.user_id.as_deref())?,
            self.first_name,
            self.last_name,
        ))
    }

    fn try_into_admin_user(self) -> Result<AdminUser, StoreError> {
        Ok(AdminUser::new(
            parse_column::<AdminUserId>("admin user id", &self.id)?,
            self.email,
            self.active,
            parse_optional("user id", self.user_id.as_deref())?,
            self.first_name,
            self.last_name,
        ))
    }
}

/// Row type for role queries.
#[derive(FromRow)]
struct RoleRow {
    id: String,
    role_type: String,
    role_name: String,
}

impl RoleRow {
    fn try_into_role(self) -> Result<Role, StoreError> {
        Ok(Role::new(
            parse_column::<RoleId>("role id", &self.id)?,
            parse_column::<RoleType>("role type", &self.role_type)?,
            self.role_name,
        ))
    }
}

/// Row type for the identity projection, without roles.
#[derive(FromRow)]
struct IdentityRow {
    id: String,
    login_gov_email: String,
    service_member_id: Option<String>,
    sm_first_name: Option<String>,
    sm_middle_name: Option<String>,
    sm_last_name: Option<String>,
    office_user_id: Option<String>,
    office_active: Option<bool>,
    office_first_name: Option<String>,
    office_last_name: Option<String>,
    admin_user_id: Option<String>,
    admin_active: Option<bool>,
}

impl IdentityRow {
    fn try_into_identity(self, roles: Vec<Role>) -> Result<UserIdentity, StoreError> {
        Ok(UserIdentity {
            id: parse_column::<UserId>("user id", &self.id)?,
            login_gov_email: self.login_gov_email,
            service_member_id: parse_optional::<ServiceMemberId>(
                "service member id",
                self.service_member_id.as_deref(),
            )?,
            office_user_id: parse_optional::<OfficeUserId>(
                "office user id",
                self.office_user_id.as_deref(),
            )?,
            office_active: self.office_active,
            admin_user_id: parse_optional::<AdminUserId>(
                "admin user id",
                self.admin_user_id.as_deref(),
            )?,
            admin_active: self.admin_active,
            first_name: self.sm_first_name.or(self.office_first_name),
            last_name: self.sm_last_name.or(self.office_last_name),
            middle: self.sm_middle_name,
            roles,
        })
    }
}

/// Row type for client certificate queries.
#[derive(FromRow)]
struct ClientCertRow {
    id: String,
    sha256_digest: String,
    subject: String,
    allow_orders_api: bool,
    allow_prime: bool,
    allow_army_orders_read: bool,
    allow_army_orders_write: bool,
    allow_navy_orders_read: bool,
    allow_navy_orders_write: bool,
    allow_marine_corps_orders_read: bool,
    allow_marine_corps_orders_write: bool,
    allow_air_force_orders_read: bool,
    allow_air_force_orders_write: bool,
    allow_coast_guard_orders_read: bool,
    allow_coast_guard_orders_write: bool,
}

impl ClientCertRow {
    fn try_into_client_cert(self) -> Result<ClientCert, StoreError> {
        let permissions = ClientCertPermissions {
            allow_orders_api: self.allow_orders_api,
            allow_prime: self.allow_prime,
            army: BranchAccess {
                read: self.allow_army_orders_read,
                write: self.allow_army_orders_write,
            },
            navy: BranchAccess {
                read: self.allow_navy_orders_read,
                write: self.allow_navy_orders_write,
            },
            marine_corps: BranchAccess {
                read: self.allow_marine_corps_orders_read,
                write: self.allow_marine_corps_orders_write,
            },
            air_force: BranchAccess {
                read: self.allow_air_force_orders_read,
                write: self.allow_air_force_orders_write,
            },
            coast_guard: BranchAccess {
                read: self.allow_coast_guard_orders_read,
                write: self.allow_coast_guard_orders_write,
            },
        };
        Ok(ClientCert::new(
            parse_column::<ClientCertId>("client cert id", &self.id)?,
            self.sha256_digest,
            self.subject,
            permissions,
        ))
    }
}

/// Postgres-backed store for users, staff records, roles, and client
/// certificates.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new store over `pool`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_roles(&self, user_id: UserId) -> Result<Vec<Role>, StoreError> {
        let rows: Vec<RoleRow> = sqlx::query_as(
            r#"
            SELECT r.id, r.role_type, r.role_name
            FROM roles r
            JOIN users_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.role_type
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter().map(RoleRow::try_into_role).collect()
    }

    async fn fetch_staff(&self, table: StaffTable, email: &str) -> Result<Option<StaffRow>, StoreError> {
        let sql = format!(
            "SELECT id, email, active, user_id, first_name, last_name FROM {} WHERE LOWER(email) = LOWER($1)",
            table.name()
        );
        sqlx::query_as(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)
    }

    /// Sets `user_id` on an unclaimed row and returns the row as stored.
    async fn claim_staff(
        &self,
        table: StaffTable,
        id: &str,
        user_id: UserId,
    ) -> Result<StaffRow, StoreError> {
        let update = format!(
            "UPDATE {} SET user_id = $2, updated_at = NOW() WHERE id = $1 AND user_id IS NULL",
            table.name()
        );
        sqlx::query(&update)
            .bind(id)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        let select = format!(
            "SELECT id, email, active, user_id, first_name, last_name FROM {} WHERE id = $1",
            table.name()
        );
        sqlx::query_as(&select)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?
            .ok_or_else(|| StoreError::Inconsistent {
                details: format!("{} row {id} disappeared while claiming", table.name()),
            })
    }
}

#[derive(Clone, Copy)]
enum StaffTable {
    Office,
    Admin,
}

impl StaffTable {
    fn name(self) -> &'static str {
        match self {
            Self::Office => "office_users",
            Self::Admin => "admin_users",
        }
    }
}

#[async_trait]
impl UserStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn find_user_by_login_gov_uuid(
        &self,
        login_gov_uuid: &str,
    ) -> Result<Option<User>, Report<StoreError>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, login_gov_uuid, login_gov_email
            FROM users
            WHERE login_gov_uuid = $1
            "#,
        )
        .bind(login_gov_uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        match row {
            Some(r) => Ok(Some(r.try_into_user()?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self, user), fields(login_gov_uuid = %user.login_gov_uuid()))]
    async fn create_user(&self, user: User) -> Result<User, Report<StoreError>> {
        sqlx::query(
            r#"
            INSERT INTO users (id, login_gov_uuid, login_gov_email)
            VALUES ($1, $2, $3)
            ON CONFLICT (login_gov_uuid) DO NOTHING
            "#,
        )
        .bind(user.id().to_string())
        .bind(user.login_gov_uuid())
        .bind(user.login_gov_email())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        self.find_user_by_login_gov_uuid(user.login_gov_uuid())
            .await?
            .ok_or_else(|| {
                StoreError::Inconsistent {
                    details: format!("user {} missing after insert", user.login_gov_uuid()),
                }
                .into()
            })
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_user_identity(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserIdentity>, Report<StoreError>> {
        let row: Option<IdentityRow> = sqlx::query_as(
            r#"
            SELECT
                u.id,
                u.login_gov_email,
                sm.id AS service_member_id,
                sm.first_name AS sm_first_name,
                sm.middle_name AS sm_middle_name,
                sm.last_name AS sm_last_name,
                ou.id AS office_user_id,
                ou.active AS office_active,
                ou.first_name AS office_first_name,
                ou.last_name AS office_last_name,
                au.id AS admin_user_id,
                au.active AS admin_active
            FROM users u
            LEFT JOIN service_members sm ON sm.user_id = u.id
            LEFT JOIN office_users ou ON ou.user_id = u.id
            LEFT JOIN admin_users au ON au.user_id = u.id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let roles = self.fetch_roles(user_id).await?;
        Ok(Some(row.try_into_identity(roles)?))
    }
}

#[async_trait]
impl OfficeUserStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn fetch_office_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<OfficeUser>, Report<StoreError>> {
        match self.fetch_staff(StaffTable::Office, email).await? {
            Some(r) => Ok(Some(r.try_into_office_user()?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn claim_office_user(
        &self,
        id: OfficeUserId,
        user_id: UserId,
    ) -> Result<OfficeUser, Report<StoreError>> {
        let row = self
            .claim_staff(StaffTable::Office, &id.to_string(), user_id)
            .await?;
        Ok(row.try_into_office_user()?)
    }
}

#[async_trait]
impl AdminUserStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn fetch_admin_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AdminUser>, Report<StoreError>> {
        match self.fetch_staff(StaffTable::Admin, email).await? {
            Some(r) => Ok(Some(r.try_into_admin_user()?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn claim_admin_user(
        &self,
        id: AdminUserId,
        user_id: UserId,
    ) -> Result<AdminUser, Report<StoreError>> {
        let row = self
            .claim_staff(StaffTable::Admin, &id.to_string(), user_id)
            .await?;
        Ok(row.try_into_admin_user()?)
    }
}

#[async_trait]
impl ClientCertStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn fetch_client_cert(
        &self,
        sha256_digest: &str,
    ) -> Result<Option<ClientCert>, Report<StoreError>> {
        let row: Option<ClientCertRow> = sqlx::query_as(
            r#"
            SELECT id, sha256_digest, subject, allow_orders_api, allow_prime,
                   allow_army_orders_read, allow_army_orders_write,
                   allow_navy_orders_read, allow_navy_orders_write,
                   allow_marine_corps_orders_read, allow_marine_corps_orders_write,
                   allow_air_force_orders_read, allow_air_force_orders_write,
                   allow_coast_guard_orders_read, allow_coast_guard_orders_write
            FROM client_certs
            WHERE sha256_digest = $1
            "#,
        )
        .bind(sha256_digest)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        match row {
            Some(r) => Ok(Some(r.try_into_client_cert()?)),
            None => Ok(None),
        }
    }
}
