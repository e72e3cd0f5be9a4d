//! SQL for every store operation.
//!
//! Each function takes a plain `&mut PgConnection`, so the same query runs on
//! a pooled connection or inside an open transaction.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;
use vidly_core::error::StoreError;
use vidly_core::types::{
    Customer, CustomerId, CustomerSnapshot, Genre, GenreId, GenreSnapshot,
    MAX_RENTALS_PER_CUSTOMER, Money, Movie, MovieId, MovieSnapshot, Rental, RentalId, RentalKind,
    Transaction, TransactionId, User, UserId,
};

// ============================================================================
// Error mapping
// ============================================================================

/// Any driver failure.
pub fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Driver failure on a write; unique violations (SQLSTATE 23505) become
/// [`StoreError::Duplicate`].
fn write_failed(entity: &'static str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let reason = db_err
                .constraint()
                .map_or_else(|| db_err.message().to_string(), ToString::to_string);
            return StoreError::Duplicate { entity, reason };
        }
    }
    backend(err)
}

// ============================================================================
// Rows
// ============================================================================

#[derive(sqlx::FromRow)]
struct GenreRow {
    id: Uuid,
    name: String,
}

impl From<GenreRow> for Genre {
    fn from(row: GenreRow) -> Self {
        Self {
            id: GenreId::from_uuid(row.id),
            name: row.name,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MovieRow {
    id: Uuid,
    title: String,
    genre_id: Uuid,
    genre_name: String,
    number_in_stock: i32,
    daily_rental_rate_cents: i64,
    pending_transactions: Vec<Uuid>,
}

impl From<MovieRow> for Movie {
    fn from(row: MovieRow) -> Self {
        Self {
            id: MovieId::from_uuid(row.id),
            title: row.title,
            genre: GenreSnapshot {
                id: GenreId::from_uuid(row.genre_id),
                name: row.genre_name,
            },
            number_in_stock: u32::try_from(row.number_in_stock).unwrap_or_default(),
            daily_rental_rate: Money::from_cents(row.daily_rental_rate_cents),
            pending_transactions: row
                .pending_transactions
                .into_iter()
                .map(TransactionId::from_uuid)
                .collect(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    name: String,
    phone: String,
    is_gold: bool,
    number_of_movies_rented: i32,
    pending_transactions: Vec<Uuid>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Self {
            id: CustomerId::from_uuid(row.id),
            name: row.name,
            phone: row.phone,
            is_gold: row.is_gold,
            number_of_movies_rented: u32::try_from(row.number_of_movies_rented)
                .unwrap_or_default(),
            pending_transactions: row
                .pending_transactions
                .into_iter()
                .map(TransactionId::from_uuid)
                .collect(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    is_admin: bool,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from_uuid(row.id),
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            is_admin: row.is_admin,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RentalRow {
    id: Uuid,
    customer_id: Uuid,
    customer_name: String,
    customer_phone: String,
    movie_id: Uuid,
    movie_title: String,
    daily_rental_rate_cents: i64,
    date_out: DateTime<Utc>,
    date_returned: Option<DateTime<Utc>>,
    rental_type: String,
    rental_fee_cents: Option<i64>,
}

impl TryFrom<RentalRow> for Rental {
    type Error = StoreError;

    fn try_from(row: RentalRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: RentalId::from_uuid(row.id),
            customer: CustomerSnapshot {
                id: CustomerId::from_uuid(row.customer_id),
                name: row.customer_name,
                phone: row.customer_phone,
            },
            movie: MovieSnapshot {
                id: MovieId::from_uuid(row.movie_id),
                title: row.movie_title,
                daily_rental_rate: Money::from_cents(row.daily_rental_rate_cents),
            },
            date_out: row.date_out,
            date_returned: row.date_returned,
            rental_type: row.rental_type.parse().map_err(StoreError::Backend)?,
            rental_fee: row.rental_fee_cents.map(Money::from_cents),
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    source: Uuid,
    destination: Uuid,
    state: String,
    transaction_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TransactionId::from_uuid(row.id),
            source: MovieId::from_uuid(row.source),
            destination: CustomerId::from_uuid(row.destination),
            state: row.state.parse().map_err(StoreError::Backend)?,
            transaction_type: row.transaction_type.parse().map_err(StoreError::Backend)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const MOVIE_COLUMNS: &str = "id, title, genre_id, genre_name, number_in_stock, \
     daily_rental_rate_cents, pending_transactions";
const CUSTOMER_COLUMNS: &str =
    "id, name, phone, is_gold, number_of_movies_rented, pending_transactions";
const RENTAL_COLUMNS: &str = "id, customer_id, customer_name, customer_phone, movie_id, \
     movie_title, daily_rental_rate_cents, date_out, date_returned, rental_type, rental_fee_cents";
const USER_COLUMNS: &str = "id, name, email, password_hash, is_admin";

fn lock_clause(lock: bool) -> &'static str {
    if lock { " FOR UPDATE" } else { "" }
}

// ============================================================================
// Genres
// ============================================================================

pub async fn find_genre(conn: &mut PgConnection, id: GenreId) -> Result<Option<Genre>, StoreError> {
    sqlx::query_as::<_, GenreRow>("SELECT id, name FROM genres WHERE id = $1")
        .bind(*id.as_uuid())
        .fetch_optional(conn)
        .await
        .map(|row| row.map(Genre::from))
        .map_err(backend)
}

pub async fn list_genres(conn: &mut PgConnection) -> Result<Vec<Genre>, StoreError> {
    sqlx::query_as::<_, GenreRow>("SELECT id, name FROM genres ORDER BY name")
        .fetch_all(conn)
        .await
        .map(|rows| rows.into_iter().map(Genre::from).collect())
        .map_err(backend)
}

pub async fn insert_genre(conn: &mut PgConnection, genre: &Genre) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO genres (id, name) VALUES ($1, $2)")
        .bind(*genre.id.as_uuid())
        .bind(&genre.name)
        .execute(conn)
        .await
        .map(|_| ())
        .map_err(|e| write_failed("genre", e))
}

pub async fn update_genre(conn: &mut PgConnection, genre: &Genre) -> Result<Option<Genre>, StoreError> {
    sqlx::query_as::<_, GenreRow>("UPDATE genres SET name = $2 WHERE id = $1 RETURNING id, name")
        .bind(*genre.id.as_uuid())
        .bind(&genre.name)
        .fetch_optional(conn)
        .await
        .map(|row| row.map(Genre::from))
        .map_err(|e| write_failed("genre", e))
}

pub async fn delete_genre(conn: &mut PgConnection, id: GenreId) -> Result<Option<Genre>, StoreError> {
    sqlx::query_as::<_, GenreRow>("DELETE FROM genres WHERE id = $1 RETURNING id, name")
        .bind(*id.as_uuid())
        .fetch_optional(conn)
        .await
        .map(|row| row.map(Genre::from))
        .map_err(backend)
}

pub async fn delete_all_genres(conn: &mut PgConnection) -> Result<u64, StoreError> {
    sqlx::query("DELETE FROM genres")
        .execute(conn)
        .await
        .map(|r| r.rows_affected())
        .map_err(backend)
}

// ============================================================================
// Movies
// ============================================================================

pub async fn find_movie(
    conn: &mut PgConnection,
    id: MovieId,
    lock: bool,
) -> Result<Option<Movie>, StoreError> {
    let sql = format!(
        "SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1{}",
        lock_clause(lock)
    );
    sqlx::query_as::<_, MovieRow>(&sql)
        .bind(*id.as_uuid())
        .fetch_optional(conn)
        .await
        .map(|row| row.map(Movie::from))
        .map_err(backend)
}

pub async fn list_movies(conn: &mut PgConnection) -> Result<Vec<Movie>, StoreError> {
    let sql = format!("SELECT {MOVIE_COLUMNS} FROM movies ORDER BY title");
    sqlx::query_as::<_, MovieRow>(&sql)
        .fetch_all(conn)
        .await
        .map(|rows| rows.into_iter().map(Movie::from).collect())
        .map_err(backend)
}

pub async fn insert_movie(conn: &mut PgConnection, movie: &Movie) -> Result<(), StoreError> {
    let pending: Vec<Uuid> = movie
        .pending_transactions
        .iter()
        .map(|t| *t.as_uuid())
        .collect();
    sqlx::query(
        "INSERT INTO movies (id, title, genre_id, genre_name, number_in_stock, \
         daily_rental_rate_cents, pending_transactions) VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(*movie.id.as_uuid())
    .bind(&movie.title)
    .bind(*movie.genre.id.as_uuid())
    .bind(&movie.genre.name)
    .bind(i32::try_from(movie.number_in_stock).unwrap_or(i32::MAX))
    .bind(movie.daily_rental_rate.cents())
    .bind(pending)
    .execute(conn)
    .await
    .map(|_| ())
    .map_err(|e| write_failed("movie", e))
}

/// Catalog fields only; pending markers belong to the rental workflow.
pub async fn update_movie(conn: &mut PgConnection, movie: &Movie) -> Result<Option<Movie>, StoreError> {
    let sql = format!(
        "UPDATE movies SET title = $2, genre_id = $3, genre_name = $4, number_in_stock = $5, \
         daily_rental_rate_cents = $6 WHERE id = $1 RETURNING {MOVIE_COLUMNS}"
    );
    sqlx::query_as::<_, MovieRow>(&sql)
        .bind(*movie.id.as_uuid())
        .bind(&movie.title)
        .bind(*movie.genre.id.as_uuid())
        .bind(&movie.genre.name)
        .bind(i32::try_from(movie.number_in_stock).unwrap_or(i32::MAX))
        .bind(movie.daily_rental_rate.cents())
        .fetch_optional(conn)
        .await
        .map(|row| row.map(Movie::from))
        .map_err(|e| write_failed("movie", e))
}

pub async fn adjust_movie_stock(
    conn: &mut PgConnection,
    id: MovieId,
    delta: i32,
    marker: Option<TransactionId>,
) -> Result<Movie, StoreError> {
    let sql = format!(
        "UPDATE movies SET number_in_stock = number_in_stock + $2, \
         pending_transactions = CASE \
             WHEN $3::uuid IS NULL OR $3 = ANY(pending_transactions) THEN pending_transactions \
             ELSE array_append(pending_transactions, $3) END \
         WHERE id = $1 AND number_in_stock + $2 >= 0 \
         RETURNING {MOVIE_COLUMNS}"
    );
    let updated = sqlx::query_as::<_, MovieRow>(&sql)
        .bind(*id.as_uuid())
        .bind(delta)
        .bind(marker.map(|m| *m.as_uuid()))
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;

    match updated {
        Some(row) => Ok(row.into()),
        None if find_movie(conn, id, false).await?.is_some() => Err(StoreError::conflict(
            "movie",
            id,
            "stock would go negative",
        )),
        None => Err(StoreError::not_found("movie", id)),
    }
}

pub async fn delete_movie(conn: &mut PgConnection, id: MovieId) -> Result<Option<Movie>, StoreError> {
    let sql = format!(
        "DELETE FROM movies WHERE id = $1 AND NOT EXISTS \
         (SELECT 1 FROM rentals WHERE movie_id = $1 AND date_returned IS NULL) \
         RETURNING {MOVIE_COLUMNS}"
    );
    let deleted = sqlx::query_as::<_, MovieRow>(&sql)
        .bind(*id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;

    match deleted {
        Some(row) => Ok(Some(row.into())),
        None if find_movie(conn, id, false).await?.is_some() => Err(StoreError::conflict(
            "movie",
            id,
            "referenced by an active rental",
        )),
        None => Ok(None),
    }
}

pub async fn delete_all_movies(conn: &mut PgConnection) -> Result<u64, StoreError> {
    sqlx::query(
        "DELETE FROM movies m WHERE NOT EXISTS \
         (SELECT 1 FROM rentals r WHERE r.movie_id = m.id AND r.date_returned IS NULL)",
    )
    .execute(conn)
    .await
    .map(|r| r.rows_affected())
    .map_err(backend)
}

// ============================================================================
// Customers
// ============================================================================

pub async fn find_customer(
    conn: &mut PgConnection,
    id: CustomerId,
    lock: bool,
) -> Result<Option<Customer>, StoreError> {
    let sql = format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1{}",
        lock_clause(lock)
    );
    sqlx::query_as::<_, CustomerRow>(&sql)
        .bind(*id.as_uuid())
        .fetch_optional(conn)
        .await
        .map(|row| row.map(Customer::from))
        .map_err(backend)
}

pub async fn list_customers(conn: &mut PgConnection) -> Result<Vec<Customer>, StoreError> {
    let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY name");
    sqlx::query_as::<_, CustomerRow>(&sql)
        .fetch_all(conn)
        .await
        .map(|rows| rows.into_iter().map(Customer::from).collect())
        .map_err(backend)
}

pub async fn insert_customer(conn: &mut PgConnection, customer: &Customer) -> Result<(), StoreError> {
    let pending: Vec<Uuid> = customer
        .pending_transactions
        .iter()
        .map(|t| *t.as_uuid())
        .collect();
    sqlx::query(
        "INSERT INTO customers (id, name, phone, is_gold, number_of_movies_rented, \
         pending_transactions) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(*customer.id.as_uuid())
    .bind(&customer.name)
    .bind(&customer.phone)
    .bind(customer.is_gold)
    .bind(i32::try_from(customer.number_of_movies_rented).unwrap_or(i32::MAX))
    .bind(pending)
    .execute(conn)
    .await
    .map(|_| ())
    .map_err(|e| write_failed("customer", e))
}

/// Contact details and membership only; the rented count and pending
/// markers change through [`adjust_customer_rentals`] alone.
pub async fn update_customer(
    conn: &mut PgConnection,
    customer: &Customer,
) -> Result<Option<Customer>, StoreError> {
    let sql = format!(
        "UPDATE customers SET name = $2, phone = $3, is_gold = $4 WHERE id = $1 \
         RETURNING {CUSTOMER_COLUMNS}"
    );
    sqlx::query_as::<_, CustomerRow>(&sql)
        .bind(*customer.id.as_uuid())
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(customer.is_gold)
        .fetch_optional(conn)
        .await
        .map(|row| row.map(Customer::from))
        .map_err(|e| write_failed("customer", e))
}

pub async fn adjust_customer_rentals(
    conn: &mut PgConnection,
    id: CustomerId,
    delta: i32,
    marker: Option<TransactionId>,
) -> Result<Customer, StoreError> {
    let sql = format!(
        "UPDATE customers SET number_of_movies_rented = number_of_movies_rented + $2, \
         pending_transactions = CASE \
             WHEN $3::uuid IS NULL OR $3 = ANY(pending_transactions) THEN pending_transactions \
             ELSE array_append(pending_transactions, $3) END \
         WHERE id = $1 AND number_of_movies_rented + $2 BETWEEN 0 AND $4 \
         RETURNING {CUSTOMER_COLUMNS}"
    );
    let updated = sqlx::query_as::<_, CustomerRow>(&sql)
        .bind(*id.as_uuid())
        .bind(delta)
        .bind(marker.map(|m| *m.as_uuid()))
        .bind(i32::try_from(MAX_RENTALS_PER_CUSTOMER).unwrap_or(i32::MAX))
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;

    match updated {
        Some(row) => Ok(row.into()),
        None if find_customer(conn, id, false).await?.is_some() => Err(StoreError::conflict(
            "customer",
            id,
            format!("rented count must stay within 0..={MAX_RENTALS_PER_CUSTOMER}"),
        )),
        None => Err(StoreError::not_found("customer", id)),
    }
}

pub async fn delete_customer(
    conn: &mut PgConnection,
    id: CustomerId,
) -> Result<Option<Customer>, StoreError> {
    let sql = format!(
        "DELETE FROM customers WHERE id = $1 AND NOT EXISTS \
         (SELECT 1 FROM rentals WHERE customer_id = $1 AND date_returned IS NULL) \
         RETURNING {CUSTOMER_COLUMNS}"
    );
    let deleted = sqlx::query_as::<_, CustomerRow>(&sql)
        .bind(*id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;

    match deleted {
        Some(row) => Ok(Some(row.into())),
        None if find_customer(conn, id, false).await?.is_some() => Err(StoreError::conflict(
            "customer",
            id,
            "referenced by an active rental",
        )),
        None => Ok(None),
    }
}

pub async fn delete_all_customers(conn: &mut PgConnection) -> Result<u64, StoreError> {
    sqlx::query(
        "DELETE FROM customers c WHERE NOT EXISTS \
         (SELECT 1 FROM rentals r WHERE r.customer_id = c.id AND r.date_returned IS NULL)",
    )
    .execute(conn)
    .await
    .map(|r| r.rows_affected())
    .map_err(backend)
}

// ============================================================================
// Users
// ============================================================================

pub async fn find_user(conn: &mut PgConnection, id: UserId) -> Result<Option<User>, StoreError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(*id.as_uuid())
        .fetch_optional(conn)
        .await
        .map(|row| row.map(User::from))
        .map_err(backend)
}

pub async fn find_user_by_email(
    conn: &mut PgConnection,
    email: &str,
) -> Result<Option<User>, StoreError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(email)
        .fetch_optional(conn)
        .await
        .map(|row| row.map(User::from))
        .map_err(backend)
}

pub async fn list_users(conn: &mut PgConnection) -> Result<Vec<User>, StoreError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY name");
    sqlx::query_as::<_, UserRow>(&sql)
        .fetch_all(conn)
        .await
        .map(|rows| rows.into_iter().map(User::from).collect())
        .map_err(backend)
}

pub async fn insert_user(conn: &mut PgConnection, user: &User) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, is_admin) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(*user.id.as_uuid())
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.is_admin)
    .execute(conn)
    .await
    .map(|_| ())
    .map_err(|e| write_failed("user", e))
}

pub async fn update_user(conn: &mut PgConnection, user: &User) -> Result<Option<User>, StoreError> {
    let sql = format!(
        "UPDATE users SET name = $2, email = $3, password_hash = $4, is_admin = $5 WHERE id = $1 \
         RETURNING {USER_COLUMNS}"
    );
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(*user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .fetch_optional(conn)
        .await
        .map(|row| row.map(User::from))
        .map_err(|e| write_failed("user", e))
}

pub async fn delete_user(conn: &mut PgConnection, id: UserId) -> Result<Option<User>, StoreError> {
    let sql = format!("DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}");
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(*id.as_uuid())
        .fetch_optional(conn)
        .await
        .map(|row| row.map(User::from))
        .map_err(backend)
}

pub async fn delete_all_users(conn: &mut PgConnection) -> Result<u64, StoreError> {
    sqlx::query("DELETE FROM users")
        .execute(conn)
        .await
        .map(|r| r.rows_affected())
        .map_err(backend)
}

// ============================================================================
// Rentals
// ============================================================================

pub async fn find_rental(conn: &mut PgConnection, id: RentalId) -> Result<Option<Rental>, StoreError> {
    let sql = format!("SELECT {RENTAL_COLUMNS} FROM rentals WHERE id = $1");
    sqlx::query_as::<_, RentalRow>(&sql)
        .bind(*id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(backend)?
        .map(Rental::try_from)
        .transpose()
}

pub async fn find_active_rental(
    conn: &mut PgConnection,
    customer_id: CustomerId,
    movie_id: MovieId,
    lock: bool,
) -> Result<Option<Rental>, StoreError> {
    let sql = format!(
        "SELECT {RENTAL_COLUMNS} FROM rentals \
         WHERE customer_id = $1 AND movie_id = $2 AND date_returned IS NULL \
         AND rental_type = 'borrow' LIMIT 1{}",
        lock_clause(lock)
    );
    sqlx::query_as::<_, RentalRow>(&sql)
        .bind(*customer_id.as_uuid())
        .bind(*movie_id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(backend)?
        .map(Rental::try_from)
        .transpose()
}

pub async fn list_rentals(
    conn: &mut PgConnection,
    kind: RentalKind,
) -> Result<Vec<Rental>, StoreError> {
    let sql = format!(
        "SELECT {RENTAL_COLUMNS} FROM rentals WHERE rental_type = $1 ORDER BY date_out DESC"
    );
    sqlx::query_as::<_, RentalRow>(&sql)
        .bind(kind.as_str())
        .fetch_all(conn)
        .await
        .map_err(backend)?
        .into_iter()
        .map(Rental::try_from)
        .collect()
}

pub async fn write_rental(
    conn: &mut PgConnection,
    rental: &Rental,
    upsert: bool,
) -> Result<(), StoreError> {
    let conflict = if upsert {
        " ON CONFLICT (id) DO UPDATE SET customer_id = EXCLUDED.customer_id, \
         customer_name = EXCLUDED.customer_name, customer_phone = EXCLUDED.customer_phone, \
         movie_id = EXCLUDED.movie_id, movie_title = EXCLUDED.movie_title, \
         daily_rental_rate_cents = EXCLUDED.daily_rental_rate_cents, \
         date_out = EXCLUDED.date_out, date_returned = EXCLUDED.date_returned, \
         rental_type = EXCLUDED.rental_type, rental_fee_cents = EXCLUDED.rental_fee_cents"
    } else {
        ""
    };
    let sql = format!(
        "INSERT INTO rentals ({RENTAL_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11){conflict}"
    );
    sqlx::query(&sql)
        .bind(*rental.id.as_uuid())
        .bind(*rental.customer.id.as_uuid())
        .bind(&rental.customer.name)
        .bind(&rental.customer.phone)
        .bind(*rental.movie.id.as_uuid())
        .bind(&rental.movie.title)
        .bind(rental.movie.daily_rental_rate.cents())
        .bind(rental.date_out)
        .bind(rental.date_returned)
        .bind(rental.rental_type.as_str())
        .bind(rental.rental_fee.map(Money::cents))
        .execute(conn)
        .await
        .map_err(|e| write_failed("rental", e))?;
    Ok(())
}

pub async fn close_rental(conn: &mut PgConnection, rental: &Rental) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE rentals SET date_returned = $2, rental_type = $3, rental_fee_cents = $4 \
         WHERE id = $1 AND date_returned IS NULL",
    )
    .bind(*rental.id.as_uuid())
    .bind(rental.date_returned)
    .bind(rental.rental_type.as_str())
    .bind(rental.rental_fee.map(Money::cents))
    .execute(&mut *conn)
    .await
    .map_err(backend)?;

    if result.rows_affected() == 1 {
        return Ok(());
    }
    if find_rental(conn, rental.id).await?.is_some() {
        Err(StoreError::conflict("rental", rental.id, "already returned"))
    } else {
        Err(StoreError::not_found("rental", rental.id))
    }
}

pub async fn delete_rental(conn: &mut PgConnection, id: RentalId) -> Result<Option<Rental>, StoreError> {
    let sql = format!("DELETE FROM rentals WHERE id = $1 RETURNING {RENTAL_COLUMNS}");
    sqlx::query_as::<_, RentalRow>(&sql)
        .bind(*id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(backend)?
        .map(Rental::try_from)
        .transpose()
}

// ============================================================================
// Transactions
// ============================================================================

pub async fn save_transaction(
    conn: &mut PgConnection,
    transaction: &Transaction,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO transactions \
         (id, source, destination, state, transaction_type, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (id) DO UPDATE SET state = EXCLUDED.state, updated_at = EXCLUDED.updated_at",
    )
    .bind(*transaction.id.as_uuid())
    .bind(*transaction.source.as_uuid())
    .bind(*transaction.destination.as_uuid())
    .bind(transaction.state.as_str())
    .bind(transaction.transaction_type.as_str())
    .bind(transaction.created_at)
    .bind(transaction.updated_at)
    .execute(conn)
    .await
    .map_err(|e| write_failed("transaction", e))?;
    Ok(())
}

pub async fn find_transaction(
    conn: &mut PgConnection,
    id: TransactionId,
) -> Result<Option<Transaction>, StoreError> {
    sqlx::query_as::<_, TransactionRow>(
        "SELECT id, source, destination, state, transaction_type, created_at, updated_at \
         FROM transactions WHERE id = $1",
    )
    .bind(*id.as_uuid())
    .fetch_optional(conn)
    .await
    .map_err(backend)?
    .map(Transaction::try_from)
    .transpose()
}

pub async fn release_pending_markers(
    conn: &mut PgConnection,
    transaction_id: TransactionId,
    movie_id: MovieId,
    customer_id: CustomerId,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE movies SET pending_transactions = array_remove(pending_transactions, $1) \
         WHERE id = $2",
    )
    .bind(*transaction_id.as_uuid())
    .bind(*movie_id.as_uuid())
    .execute(&mut *conn)
    .await
    .map_err(backend)?;

    sqlx::query(
        "UPDATE customers SET pending_transactions = array_remove(pending_transactions, $1) \
         WHERE id = $2",
    )
    .bind(*transaction_id.as_uuid())
    .bind(*customer_id.as_uuid())
    .execute(conn)
    .await
    .map_err(backend)?;
    Ok(())
}

pub async fn ping(conn: &mut PgConnection) -> Result<(), StoreError> {
    sqlx::query("SELECT 1").execute(conn).await.map_err(backend)?;
    Ok(())
}
