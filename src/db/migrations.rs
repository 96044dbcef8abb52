use anyhow::Context;
use rusqlite::Connection;

/// Migrations are embedded so the service ships as a single binary. Each
/// entry runs at most once, tracked in the `_migrations` table.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_initial_schema",
        "CREATE TABLE IF NOT EXISTS prices (
            catalog_id TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            price_minor INTEGER NOT NULL,
            currency TEXT NOT NULL DEFAULT 'INR',
            active INTEGER NOT NULL DEFAULT 1,
            category TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS bookings (
            reference_id TEXT PRIMARY KEY,
            client_name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            message TEXT,
            category TEXT NOT NULL DEFAULT '',
            services TEXT NOT NULL DEFAULT '[]',
            schedule_date TEXT,
            schedule_slot TEXT,
            timeframe TEXT,
            status TEXT NOT NULL DEFAULT 'scheduled',
            payment_id TEXT,
            order_id TEXT,
            amount_minor INTEGER,
            currency TEXT NOT NULL DEFAULT 'INR',
            email_sent INTEGER NOT NULL DEFAULT 0,
            source TEXT NOT NULL DEFAULT 'website',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bookings_email_sweep
            ON bookings (email_sent, status);

        CREATE TABLE IF NOT EXISTS payments (
            transaction_id TEXT PRIMARY KEY,
            reference_id TEXT NOT NULL,
            order_id TEXT,
            amount_minor INTEGER NOT NULL,
            status TEXT NOT NULL,
            email_sent INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_payments_reference
            ON payments (reference_id);

        CREATE TABLE IF NOT EXISTS checkout_snapshots (
            reference_id TEXT PRIMARY KEY,
            draft TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS admin_sessions (
            token TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );",
    ),
    (
        "002_seed_catalog",
        "INSERT OR IGNORE INTO prices (catalog_id, label, price_minor, currency, active, category) VALUES
            ('SVC-COUNSEL-IND',  'Individual Counselling Session', 150000, 'INR', 1, 'counselling'),
            ('SVC-COUNSEL-CPL',  'Couples Counselling Session',    250000, 'INR', 1, 'counselling'),
            ('SVC-COUNSEL-FAM',  'Family Counselling Session',     280000, 'INR', 1, 'counselling'),
            ('SVC-LEGAL-CONSULT','Legal Consultation',             200000, 'INR', 1, 'legal'),
            ('SVC-LEGAL-DOC',    'Legal Document Review',          120000, 'INR', 1, 'legal'),
            ('PKG-WELLNESS',     'Wellness Package (3 sessions)',  382500, 'INR', 1, 'counselling');",
    ),
];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}
