//! Ascending, idempotent schema migrations (spec §4.2). Each entry runs
//! inside its own transaction; `schema_version` records how far we've gotten.

/// `(version, statements)` in ascending order. Every statement uses
/// `IF NOT EXISTS` so re-running a migration that already applied is a no-op.
pub const MIGRATIONS: &[(i64, &[&str])] = &[
    (
        1,
        &[
            "CREATE TABLE IF NOT EXISTS servers (
                name TEXT PRIMARY KEY,
                base_url TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                priority INTEGER NOT NULL DEFAULT 0,
                ip_mode TEXT NOT NULL DEFAULT 'auto',
                last_test_status TEXT
            )",
            "CREATE TABLE IF NOT EXISTS media (
                name TEXT PRIMARY KEY,
                shortid TEXT NOT NULL UNIQUE,
                enabled INTEGER NOT NULL DEFAULT 1,
                update_eligible INTEGER NOT NULL DEFAULT 1,
                priority INTEGER NOT NULL DEFAULT 0,
                replication TEXT NOT NULL DEFAULT 'none',
                seed_sections TEXT,
                quota_bytes INTEGER,
                retention_days INTEGER,
                sync_files INTEGER NOT NULL DEFAULT 0,
                shared_with_peers INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS media_servers (
                media TEXT NOT NULL REFERENCES media(name) ON DELETE CASCADE,
                server TEXT NOT NULL REFERENCES servers(name) ON DELETE CASCADE,
                PRIMARY KEY (media, server)
            )",
        ],
    ),
    (
        2,
        &[
            "CREATE TABLE IF NOT EXISTS packages (
                media TEXT NOT NULL,
                name TEXT NOT NULL,
                epoch INTEGER NOT NULL,
                version TEXT NOT NULL,
                release TEXT NOT NULL,
                arch TEXT NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                group_name TEXT NOT NULL DEFAULT '',
                size INTEGER NOT NULL DEFAULT 0,
                description TEXT,
                changelog TEXT,
                license TEXT,
                url TEXT,
                checksum TEXT,
                requires_json TEXT NOT NULL DEFAULT '[]',
                conflicts_json TEXT NOT NULL DEFAULT '[]',
                obsoletes_json TEXT NOT NULL DEFAULT '[]',
                recommends_json TEXT NOT NULL DEFAULT '[]',
                suggests_json TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (media, name, epoch, version, release, arch)
            )",
            "CREATE INDEX IF NOT EXISTS idx_packages_name ON packages(name)",
            "CREATE TABLE IF NOT EXISTS provides (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                media TEXT NOT NULL,
                name TEXT NOT NULL,
                epoch INTEGER NOT NULL,
                version TEXT NOT NULL,
                release TEXT NOT NULL,
                arch TEXT NOT NULL,
                cap_name TEXT NOT NULL,
                cap_op TEXT NOT NULL,
                cap_evr TEXT,
                FOREIGN KEY (media, name, epoch, version, release, arch)
                    REFERENCES packages(media, name, epoch, version, release, arch) ON DELETE CASCADE
            )",
            "CREATE INDEX IF NOT EXISTS idx_provides_cap_name ON provides(cap_name)",
        ],
    ),
    (
        3,
        &[
            "CREATE TABLE IF NOT EXISTS package_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                media TEXT NOT NULL,
                name TEXT NOT NULL,
                epoch INTEGER NOT NULL,
                version TEXT NOT NULL,
                release TEXT NOT NULL,
                arch TEXT NOT NULL,
                directory TEXT NOT NULL,
                basename TEXT NOT NULL,
                UNIQUE (media, name, epoch, version, release, arch, directory, basename)
            )",
            "CREATE INDEX IF NOT EXISTS idx_package_files_basename ON package_files(basename)",
            "CREATE INDEX IF NOT EXISTS idx_package_files_dir_base ON package_files(directory, basename)",
            "CREATE VIRTUAL TABLE IF NOT EXISTS package_files_fts USING fts5(
                directory, basename,
                content='package_files', content_rowid='id'
            )",
            "CREATE TABLE IF NOT EXISTS file_index_state (
                media TEXT PRIMARY KEY,
                raw_md5 TEXT,
                file_count INTEGER NOT NULL,
                package_count INTEGER NOT NULL,
                compressed_size INTEGER NOT NULL,
                last_sync TEXT
            )",
        ],
    ),
    (
        4,
        &[
            "CREATE TABLE IF NOT EXISTS holds (
                name TEXT PRIMARY KEY,
                reason TEXT
            )",
            "CREATE TABLE IF NOT EXISTS lists (
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (kind, name)
            )",
            "CREATE TABLE IF NOT EXISTS peers (
                machine_id TEXT PRIMARY KEY,
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                distro_release TEXT NOT NULL,
                arch TEXT NOT NULL,
                served_media TEXT NOT NULL DEFAULT '[]',
                mode TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                blacklisted INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                action TEXT NOT NULL,
                status TEXT NOT NULL,
                affected_json TEXT NOT NULL DEFAULT '[]',
                command_line TEXT NOT NULL DEFAULT '',
                user TEXT NOT NULL DEFAULT '',
                return_code INTEGER,
                error TEXT
            )",
            "CREATE TABLE IF NOT EXISTS config_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        ],
    ),
];
