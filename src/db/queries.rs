use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{BookingRecord, BookingStatus, PaymentRecord, PriceEntry};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn now_str() -> String {
    Utc::now().naive_utc().format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).unwrap_or_else(|_| Utc::now().naive_utc())
}

// ── Price catalog ──

pub fn get_prices(conn: &Connection, catalog_ids: &[String]) -> anyhow::Result<Vec<PriceEntry>> {
    if catalog_ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders = (1..=catalog_ids.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT catalog_id, label, price_minor, currency, active, category
         FROM prices WHERE catalog_id IN ({placeholders})"
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = catalog_ids
        .iter()
        .map(|id| id as &dyn rusqlite::types::ToSql)
        .collect();
    let rows = stmt.query_map(params_refs.as_slice(), parse_price_row)?;

    let mut entries = vec![];
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

pub fn list_prices(conn: &Connection) -> anyhow::Result<Vec<PriceEntry>> {
    let mut stmt = conn.prepare(
        "SELECT catalog_id, label, price_minor, currency, active, category
         FROM prices ORDER BY catalog_id ASC",
    )?;
    let rows = stmt.query_map([], parse_price_row)?;

    let mut entries = vec![];
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

pub fn update_price(
    conn: &Connection,
    catalog_id: &str,
    price_minor: Option<i64>,
    active: Option<bool>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE prices SET
            price_minor = COALESCE(?1, price_minor),
            active = COALESCE(?2, active),
            updated_at = datetime('now')
         WHERE catalog_id = ?3",
        params![price_minor, active.map(|a| a as i32), catalog_id],
    )?;
    Ok(count > 0)
}

fn parse_price_row(row: &rusqlite::Row) -> rusqlite::Result<PriceEntry> {
    Ok(PriceEntry {
        catalog_id: row.get(0)?,
        label: row.get(1)?,
        price_minor: row.get(2)?,
        currency: row.get(3)?,
        active: row.get::<_, i32>(4)? != 0,
        category: row.get(5)?,
    })
}

// ── Bookings ──

/// Single-statement upsert keyed on reference id. This is the only write
/// path for bookings and the sole concurrency-control primitive: concurrent
/// commits for the same reference id converge instead of duplicating rows.
/// Populated contact fields are never overwritten by placeholders, and
/// `email_sent` can only move from 0 to 1 here.
pub fn upsert_booking(conn: &Connection, booking: &BookingRecord) -> anyhow::Result<()> {
    let services_json = serde_json::to_string(&booking.services)?;
    let created_at = booking.created_at.format(TS_FORMAT).to_string();
    let updated_at = booking.updated_at.format(TS_FORMAT).to_string();

    conn.execute(
        "INSERT INTO bookings (reference_id, client_name, email, phone, message, category,
                               services, schedule_date, schedule_slot, timeframe, status,
                               payment_id, order_id, amount_minor, currency, email_sent,
                               source, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
         ON CONFLICT(reference_id) DO UPDATE SET
           status = excluded.status,
           payment_id = COALESCE(excluded.payment_id, bookings.payment_id),
           order_id = COALESCE(excluded.order_id, bookings.order_id),
           amount_minor = COALESCE(excluded.amount_minor, bookings.amount_minor),
           email_sent = MAX(bookings.email_sent, excluded.email_sent),
           client_name = CASE WHEN bookings.client_name = '' THEN excluded.client_name
                              ELSE bookings.client_name END,
           email = CASE WHEN bookings.email = '' THEN excluded.email ELSE bookings.email END,
           phone = CASE WHEN bookings.phone = '' THEN excluded.phone ELSE bookings.phone END,
           message = COALESCE(bookings.message, excluded.message),
           schedule_date = COALESCE(bookings.schedule_date, excluded.schedule_date),
           schedule_slot = COALESCE(bookings.schedule_slot, excluded.schedule_slot),
           timeframe = COALESCE(bookings.timeframe, excluded.timeframe),
           updated_at = excluded.updated_at",
        params![
            booking.reference_id,
            booking.client_name,
            booking.email,
            booking.phone,
            booking.message,
            booking.category,
            services_json,
            booking.schedule_date,
            booking.schedule_slot,
            booking.timeframe,
            booking.status.as_str(),
            booking.payment_id,
            booking.order_id,
            booking.amount_minor,
            booking.currency,
            booking.email_sent as i32,
            booking.source,
            created_at,
            updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_booking(conn: &Connection, reference_id: &str) -> anyhow::Result<Option<BookingRecord>> {
    let result = conn.query_row(
        &format!("{BOOKING_SELECT} WHERE reference_id = ?1"),
        params![reference_id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_bookings(
    conn: &Connection,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<BookingRecord>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            format!("{BOOKING_SELECT} WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2"),
            vec![
                Box::new(status.to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!("{BOOKING_SELECT} ORDER BY created_at DESC LIMIT ?1"),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Records eligible for the confirmation-email sweep: payment received but
/// no email on file yet.
pub fn get_email_pending(conn: &Connection, limit: i64) -> anyhow::Result<Vec<BookingRecord>> {
    let mut stmt = conn.prepare(&format!(
        "{BOOKING_SELECT}
         WHERE email_sent = 0
           AND status IN ('confirmed', 'payment_received_needs_email', 'payment_received_needs_details')
         ORDER BY created_at ASC LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Flip the email flag after a send attempt settles. A successful send on a
/// record parked in `payment_received_needs_email` restores it to
/// `confirmed`; a degraded `needs_details` record keeps its status because
/// the booking specifics are still missing.
pub fn set_email_outcome(conn: &Connection, reference_id: &str, sent: bool) -> anyhow::Result<()> {
    if sent {
        conn.execute(
            "UPDATE bookings SET
                email_sent = 1,
                status = CASE WHEN status = 'payment_received_needs_email'
                              THEN 'confirmed' ELSE status END,
                updated_at = ?1
             WHERE reference_id = ?2",
            params![now_str(), reference_id],
        )?;
    } else {
        conn.execute(
            "UPDATE bookings SET
                status = CASE WHEN status = 'payment_received_needs_details'
                              THEN status ELSE 'payment_received_needs_email' END,
                updated_at = ?1
             WHERE reference_id = ?2 AND email_sent = 0",
            params![now_str(), reference_id],
        )?;
    }
    Ok(())
}

const BOOKING_SELECT: &str = "SELECT reference_id, client_name, email, phone, message, category,
        services, schedule_date, schedule_slot, timeframe, status, payment_id, order_id,
        amount_minor, currency, email_sent, source, created_at, updated_at FROM bookings";

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<BookingRecord> {
    let services_json: String = row.get(6)?;
    let status_str: String = row.get(10)?;
    let created_at_str: String = row.get(17)?;
    let updated_at_str: String = row.get(18)?;

    Ok(BookingRecord {
        reference_id: row.get(0)?,
        client_name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        message: row.get(4)?,
        category: row.get(5)?,
        services: serde_json::from_str(&services_json).unwrap_or_default(),
        schedule_date: row.get(7)?,
        schedule_slot: row.get(8)?,
        timeframe: row.get(9)?,
        status: BookingStatus::parse(&status_str),
        payment_id: row.get(11)?,
        order_id: row.get(12)?,
        amount_minor: row.get(13)?,
        currency: row.get(14)?,
        email_sent: row.get::<_, i32>(15)? != 0,
        source: row.get(16)?,
        created_at: parse_ts(&created_at_str),
        updated_at: parse_ts(&updated_at_str),
    })
}

// ── Payments ──

/// Idempotent on transaction id: a duplicate commit refreshes the row
/// instead of inserting a second one.
pub fn upsert_payment(conn: &Connection, payment: &PaymentRecord) -> anyhow::Result<()> {
    let created_at = payment.created_at.format(TS_FORMAT).to_string();
    conn.execute(
        "INSERT INTO payments (transaction_id, reference_id, order_id, amount_minor, status,
                               email_sent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(transaction_id) DO UPDATE SET
           status = excluded.status,
           amount_minor = excluded.amount_minor,
           email_sent = MAX(payments.email_sent, excluded.email_sent)",
        params![
            payment.transaction_id,
            payment.reference_id,
            payment.order_id,
            payment.amount_minor,
            payment.status,
            payment.email_sent as i32,
            created_at,
        ],
    )?;
    Ok(())
}

pub fn get_payment(
    conn: &Connection,
    transaction_id: &str,
) -> anyhow::Result<Option<PaymentRecord>> {
    let result = conn.query_row(
        "SELECT transaction_id, reference_id, order_id, amount_minor, status, email_sent, created_at
         FROM payments WHERE transaction_id = ?1",
        params![transaction_id],
        |row| {
            Ok(PaymentRecord {
                transaction_id: row.get(0)?,
                reference_id: row.get(1)?,
                order_id: row.get(2)?,
                amount_minor: row.get(3)?,
                status: row.get(4)?,
                email_sent: row.get::<_, i32>(5)? != 0,
                created_at: parse_ts(&row.get::<_, String>(6)?),
            })
        },
    );

    match result {
        Ok(payment) => Ok(Some(payment)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn count_payments_for_reference(conn: &Connection, reference_id: &str) -> anyhow::Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM payments WHERE reference_id = ?1",
        params![reference_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ── Checkout snapshots ──

pub fn save_snapshot(
    conn: &Connection,
    reference_id: &str,
    draft_json: &str,
    ttl_minutes: i64,
) -> anyhow::Result<()> {
    let now = Utc::now().naive_utc();
    let expires = now + chrono::Duration::minutes(ttl_minutes);
    conn.execute(
        "INSERT INTO checkout_snapshots (reference_id, draft, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(reference_id) DO UPDATE SET
           draft = excluded.draft,
           created_at = excluded.created_at,
           expires_at = excluded.expires_at",
        params![
            reference_id,
            draft_json,
            now.format(TS_FORMAT).to_string(),
            expires.format(TS_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_snapshot(conn: &Connection, reference_id: &str) -> anyhow::Result<Option<String>> {
    let result = conn.query_row(
        "SELECT draft FROM checkout_snapshots WHERE reference_id = ?1 AND expires_at > ?2",
        params![reference_id, now_str()],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(draft) => Ok(Some(draft)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn purge_expired_snapshots(conn: &Connection) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM checkout_snapshots WHERE expires_at <= ?1",
        params![now_str()],
    )?;
    Ok(count)
}

// ── Admin sessions ──

pub fn create_session(conn: &Connection, token: &str, hours: i64) -> anyhow::Result<()> {
    let now = Utc::now().naive_utc();
    let expires = now + chrono::Duration::hours(hours);
    conn.execute(
        "INSERT INTO admin_sessions (token, created_at, expires_at) VALUES (?1, ?2, ?3)",
        params![
            token,
            now.format(TS_FORMAT).to_string(),
            expires.format(TS_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn session_valid(conn: &Connection, token: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM admin_sessions WHERE token = ?1 AND expires_at > ?2",
        params![token, now_str()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn purge_expired_sessions(conn: &Connection) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM admin_sessions WHERE expires_at <= ?1",
        params![now_str()],
    )?;
    Ok(count)
}
