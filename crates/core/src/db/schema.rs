pub const SCHEMA: &str = "
-- Device-scoped owners
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,            -- UUID v4 string
    device_id TEXT NOT NULL UNIQUE, -- Stable per-install identifier
    created_at INTEGER NOT NULL     -- Unix timestamp (milliseconds)
);

-- Core prompts table
CREATE TABLE IF NOT EXISTS prompts (
    id TEXT PRIMARY KEY,            -- UUID v4 string, shared with directory files
    user_id TEXT NOT NULL REFERENCES users(id),
    title TEXT NOT NULL,            -- Display title
    description TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL,          -- The prompt text
    tags TEXT,                      -- JSON array of strings: [\"code\", \"debug\"]
    is_archived INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,    -- Unix timestamp (milliseconds)
    updated_at INTEGER NOT NULL     -- Unix timestamp (milliseconds)
);

-- Append-only content history
CREATE TABLE IF NOT EXISTS prompt_versions (
    prompt_id TEXT NOT NULL REFERENCES prompts(id) ON DELETE CASCADE,
    version_number INTEGER NOT NULL,
    content TEXT NOT NULL,
    change_note TEXT,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (prompt_id, version_number)
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_prompts_user ON prompts(user_id, is_archived);
CREATE INDEX IF NOT EXISTS idx_prompts_updated ON prompts(updated_at DESC);
";
