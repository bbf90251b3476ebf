use crate::store::Dialect;

pub fn migrations(dialect: Dialect) -> &'static [&'static str] {
    match dialect {
        Dialect::Sqlite => SQLITE_MIGRATIONS,
        Dialect::Postgres => POSTGRES_MIGRATIONS,
    }
}

// Booleans are stored as integers 0/1 in both dialects.
const SQLITE_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS computers (
        computer_id INTEGER PRIMARY KEY AUTOINCREMENT,
        host_name TEXT NOT NULL,
        user_name TEXT NOT NULL DEFAULT '',
        os_name TEXT NOT NULL DEFAULT '',
        os_version TEXT NOT NULL DEFAULT '',
        os_platform TEXT NOT NULL DEFAULT '',
        os_architecture TEXT NOT NULL DEFAULT '',
        kernel_version TEXT NOT NULL DEFAULT '',
        uptime_seconds INTEGER NOT NULL DEFAULT 0,
        process_count INTEGER NOT NULL DEFAULT 0,
        boot_time TEXT NOT NULL DEFAULT '',
        home_directory TEXT NOT NULL DEFAULT '',
        gid TEXT NOT NULL DEFAULT '',
        uid TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_computers_identity
        ON computers(host_name, user_name, os_name, os_version)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS processors (
        processor_id INTEGER PRIMARY KEY AUTOINCREMENT,
        computer_id INTEGER NOT NULL REFERENCES computers(computer_id) ON DELETE CASCADE,
        model TEXT NOT NULL DEFAULT '',
        manufacturer TEXT NOT NULL DEFAULT '',
        architecture TEXT NOT NULL DEFAULT '',
        clock_speed REAL NOT NULL DEFAULT 0,
        core_count INTEGER NOT NULL DEFAULT 0,
        thread_count INTEGER NOT NULL DEFAULT 0,
        usage_percent REAL NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS memory (
        memory_id INTEGER PRIMARY KEY AUTOINCREMENT,
        computer_id INTEGER NOT NULL REFERENCES computers(computer_id) ON DELETE CASCADE,
        total_memory_gb REAL NOT NULL DEFAULT 0,
        used_memory_gb REAL NOT NULL DEFAULT 0,
        free_memory_gb REAL NOT NULL DEFAULT 0,
        usage_percent REAL NOT NULL DEFAULT 0,
        memory_type TEXT NOT NULL DEFAULT '',
        timestamp TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS disks (
        disk_id INTEGER PRIMARY KEY AUTOINCREMENT,
        computer_id INTEGER NOT NULL REFERENCES computers(computer_id) ON DELETE CASCADE,
        drive_letter TEXT NOT NULL DEFAULT '',
        total_space_gb REAL NOT NULL DEFAULT 0,
        used_space_gb REAL NOT NULL DEFAULT 0,
        free_space_gb REAL NOT NULL DEFAULT 0,
        usage_percent REAL NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS network_adapters (
        adapter_id INTEGER PRIMARY KEY AUTOINCREMENT,
        computer_id INTEGER NOT NULL REFERENCES computers(computer_id) ON DELETE CASCADE,
        adapter_name TEXT NOT NULL DEFAULT '',
        mac_address TEXT NOT NULL DEFAULT '',
        upload_speed_mbps REAL NOT NULL DEFAULT 0,
        download_speed_mbps REAL NOT NULL DEFAULT 0,
        sent_mb REAL NOT NULL DEFAULT 0,
        received_mb REAL NOT NULL DEFAULT 0,
        sent_packets INTEGER NOT NULL DEFAULT 0,
        received_packets INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS software (
        software_id INTEGER PRIMARY KEY AUTOINCREMENT,
        computer_id INTEGER NOT NULL REFERENCES computers(computer_id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        version TEXT NOT NULL DEFAULT '',
        publisher TEXT NOT NULL DEFAULT '',
        install_date TEXT NOT NULL DEFAULT '',
        install_location TEXT NOT NULL DEFAULT '',
        size_mb REAL NOT NULL DEFAULT 0,
        is_system_component INTEGER NOT NULL DEFAULT 0,
        is_update INTEGER NOT NULL DEFAULT 0,
        architecture TEXT NOT NULL DEFAULT '',
        last_used_date TEXT NOT NULL DEFAULT '',
        timestamp TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS software_updates (
        update_id INTEGER PRIMARY KEY AUTOINCREMENT,
        software_id INTEGER NOT NULL REFERENCES software(software_id) ON DELETE CASCADE,
        update_name TEXT NOT NULL DEFAULT '',
        update_version TEXT NOT NULL DEFAULT '',
        kb_article TEXT NOT NULL DEFAULT '',
        install_date TEXT NOT NULL DEFAULT '',
        size_mb REAL NOT NULL DEFAULT 0,
        is_uninstalled INTEGER NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS software_dependencies (
        dependency_id INTEGER PRIMARY KEY AUTOINCREMENT,
        software_id INTEGER NOT NULL REFERENCES software(software_id) ON DELETE CASCADE,
        required_software_id INTEGER NOT NULL REFERENCES software(software_id) ON DELETE CASCADE,
        min_version TEXT NOT NULL DEFAULT '',
        max_version TEXT NOT NULL DEFAULT '',
        is_optional INTEGER NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tickets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        user_id INTEGER NOT NULL DEFAULT 0,
        computer_name TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'new',
        cabinet INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT '',
        updated_at TEXT NOT NULL DEFAULT ''
    )
    "#,
];

const POSTGRES_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS computers (
        computer_id BIGSERIAL PRIMARY KEY,
        host_name TEXT NOT NULL,
        user_name TEXT NOT NULL DEFAULT '',
        os_name TEXT NOT NULL DEFAULT '',
        os_version TEXT NOT NULL DEFAULT '',
        os_platform TEXT NOT NULL DEFAULT '',
        os_architecture TEXT NOT NULL DEFAULT '',
        kernel_version TEXT NOT NULL DEFAULT '',
        uptime_seconds BIGINT NOT NULL DEFAULT 0,
        process_count BIGINT NOT NULL DEFAULT 0,
        boot_time TEXT NOT NULL DEFAULT '',
        home_directory TEXT NOT NULL DEFAULT '',
        gid TEXT NOT NULL DEFAULT '',
        uid TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_computers_identity
        ON computers(host_name, user_name, os_name, os_version)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS processors (
        processor_id BIGSERIAL PRIMARY KEY,
        computer_id BIGINT NOT NULL REFERENCES computers(computer_id) ON DELETE CASCADE,
        model TEXT NOT NULL DEFAULT '',
        manufacturer TEXT NOT NULL DEFAULT '',
        architecture TEXT NOT NULL DEFAULT '',
        clock_speed DOUBLE PRECISION NOT NULL DEFAULT 0,
        core_count BIGINT NOT NULL DEFAULT 0,
        thread_count BIGINT NOT NULL DEFAULT 0,
        usage_percent DOUBLE PRECISION NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS memory (
        memory_id BIGSERIAL PRIMARY KEY,
        computer_id BIGINT NOT NULL REFERENCES computers(computer_id) ON DELETE CASCADE,
        total_memory_gb DOUBLE PRECISION NOT NULL DEFAULT 0,
        used_memory_gb DOUBLE PRECISION NOT NULL DEFAULT 0,
        free_memory_gb DOUBLE PRECISION NOT NULL DEFAULT 0,
        usage_percent DOUBLE PRECISION NOT NULL DEFAULT 0,
        memory_type TEXT NOT NULL DEFAULT '',
        timestamp TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS disks (
        disk_id BIGSERIAL PRIMARY KEY,
        computer_id BIGINT NOT NULL REFERENCES computers(computer_id) ON DELETE CASCADE,
        drive_letter TEXT NOT NULL DEFAULT '',
        total_space_gb DOUBLE PRECISION NOT NULL DEFAULT 0,
        used_space_gb DOUBLE PRECISION NOT NULL DEFAULT 0,
        free_space_gb DOUBLE PRECISION NOT NULL DEFAULT 0,
        usage_percent DOUBLE PRECISION NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS network_adapters (
        adapter_id BIGSERIAL PRIMARY KEY,
        computer_id BIGINT NOT NULL REFERENCES computers(computer_id) ON DELETE CASCADE,
        adapter_name TEXT NOT NULL DEFAULT '',
        mac_address TEXT NOT NULL DEFAULT '',
        upload_speed_mbps DOUBLE PRECISION NOT NULL DEFAULT 0,
        download_speed_mbps DOUBLE PRECISION NOT NULL DEFAULT 0,
        sent_mb DOUBLE PRECISION NOT NULL DEFAULT 0,
        received_mb DOUBLE PRECISION NOT NULL DEFAULT 0,
        sent_packets BIGINT NOT NULL DEFAULT 0,
        received_packets BIGINT NOT NULL DEFAULT 0,
        is_active BIGINT NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS software (
        software_id BIGSERIAL PRIMARY KEY,
        computer_id BIGINT NOT NULL REFERENCES computers(computer_id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        version TEXT NOT NULL DEFAULT '',
        publisher TEXT NOT NULL DEFAULT '',
        install_date TEXT NOT NULL DEFAULT '',
        install_location TEXT NOT NULL DEFAULT '',
        size_mb DOUBLE PRECISION NOT NULL DEFAULT 0,
        is_system_component BIGINT NOT NULL DEFAULT 0,
        is_update BIGINT NOT NULL DEFAULT 0,
        architecture TEXT NOT NULL DEFAULT '',
        last_used_date TEXT NOT NULL DEFAULT '',
        timestamp TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS software_updates (
        update_id BIGSERIAL PRIMARY KEY,
        software_id BIGINT NOT NULL REFERENCES software(software_id) ON DELETE CASCADE,
        update_name TEXT NOT NULL DEFAULT '',
        update_version TEXT NOT NULL DEFAULT '',
        kb_article TEXT NOT NULL DEFAULT '',
        install_date TEXT NOT NULL DEFAULT '',
        size_mb DOUBLE PRECISION NOT NULL DEFAULT 0,
        is_uninstalled BIGINT NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS software_dependencies (
        dependency_id BIGSERIAL PRIMARY KEY,
        software_id BIGINT NOT NULL REFERENCES software(software_id) ON DELETE CASCADE,
        required_software_id BIGINT NOT NULL REFERENCES software(software_id) ON DELETE CASCADE,
        min_version TEXT NOT NULL DEFAULT '',
        max_version TEXT NOT NULL DEFAULT '',
        is_optional BIGINT NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tickets (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        user_id BIGINT NOT NULL DEFAULT 0,
        computer_name TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'new',
        cabinet BIGINT NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT '',
        updated_at TEXT NOT NULL DEFAULT ''
    )
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialects_define_same_tables() {
        let tables = |stmts: &[&str]| -> Vec<String> {
            stmts
                .iter()
                .filter_map(|s| s.split("CREATE TABLE IF NOT EXISTS ").nth(1))
                .filter_map(|rest| rest.split_whitespace().next())
                .map(str::to_string)
                .collect()
        };
        let sqlite = tables(migrations(Dialect::Sqlite));
        assert_eq!(sqlite, tables(migrations(Dialect::Postgres)));
        assert_eq!(sqlite.len(), 9);
    }
}
