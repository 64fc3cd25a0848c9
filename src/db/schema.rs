pub const SCHEMA: &str = r#"
-- records table
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    natural_key TEXT NOT NULL,
    source_name TEXT NOT NULL,
    country TEXT,
    title TEXT,
    content TEXT,
    summary TEXT,
    product TEXT,
    record_type TEXT,
    publish_date TEXT,
    matched_keywords TEXT,
    risk_level TEXT,
    related INTEGER,
    remarks TEXT,
    deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(source_name, natural_key)
);

CREATE INDEX IF NOT EXISTS idx_records_risk_level ON records(risk_level, deleted);
CREATE INDEX IF NOT EXISTS idx_records_source_name ON records(source_name);

-- keywords table
CREATE TABLE IF NOT EXISTS keywords (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL DEFAULT 'NORMAL',
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- daily_country_risk_stats table
CREATE TABLE IF NOT EXISTS daily_country_risk_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stat_date TEXT NOT NULL,
    country TEXT NOT NULL,
    high_risk_count INTEGER NOT NULL DEFAULT 0,
    medium_risk_count INTEGER NOT NULL DEFAULT 0,
    low_risk_count INTEGER NOT NULL DEFAULT 0,
    no_risk_count INTEGER NOT NULL DEFAULT 0,
    total_count INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(stat_date, country)
);

CREATE INDEX IF NOT EXISTS idx_daily_stats_date ON daily_country_risk_stats(stat_date);

-- crawl_checkpoints table
CREATE TABLE IF NOT EXISTS crawl_checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    checkpoint_key TEXT NOT NULL UNIQUE,
    crawler_type TEXT NOT NULL,
    search_term TEXT,
    date_from TEXT,
    date_to TEXT,
    current_skip INTEGER NOT NULL DEFAULT 0,
    total_fetched INTEGER NOT NULL DEFAULT 0,
    target_total INTEGER,
    batch_size INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'RUNNING',
    error_message TEXT,
    last_updated TEXT NOT NULL DEFAULT (datetime('now')),
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_crawl_checkpoints_type ON crawl_checkpoints(crawler_type);

-- device_records table (kind-specific fields live in payload as JSON)
CREATE TABLE IF NOT EXISTS device_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    natural_key TEXT NOT NULL,
    risk_level TEXT NOT NULL DEFAULT 'MEDIUM',
    keywords TEXT,
    jd_country TEXT,
    data_source TEXT,
    remark TEXT,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(kind, natural_key)
);

CREATE INDEX IF NOT EXISTS idx_device_records_risk ON device_records(risk_level);

-- pending_judgments table (AI judgments waiting for human review)
CREATE TABLE IF NOT EXISTS pending_judgments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL,
    judgment TEXT NOT NULL,
    suggested_risk_level TEXT NOT NULL,
    suggested_remark TEXT,
    status TEXT NOT NULL DEFAULT 'PENDING',
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    decided_at TEXT,
    decided_by TEXT
);

CREATE INDEX IF NOT EXISTS idx_pending_judgments_status ON pending_judgments(status, expires_at);
CREATE INDEX IF NOT EXISTS idx_pending_judgments_record ON pending_judgments(record_id);
"#;
