//! Database schema constants.
//!
//! Each constant is a single statement so the migration runner can apply and
//! record them one at a time.

/// SQL schema for creating the owners table.
pub const CREATE_OWNERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS owners (
    id BIGINT PRIMARY KEY,
    username VARCHAR(255) NOT NULL UNIQUE,
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// SQL schema for creating the containers table.
pub const CREATE_CONTAINERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS containers (
    id BIGSERIAL PRIMARY KEY,
    engine_id VARCHAR(128) NOT NULL UNIQUE,
    name VARCHAR(50) NOT NULL,
    image VARCHAR(255) NOT NULL,
    status VARCHAR(20) NOT NULL,
    host_port INTEGER,
    internal_port INTEGER NOT NULL DEFAULT 22,
    env JSONB NOT NULL DEFAULT '{}'::jsonb,
    port_mappings JSONB NOT NULL DEFAULT '{}'::jsonb,
    owner_id BIGINT NOT NULL REFERENCES owners(id) ON DELETE CASCADE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    started_at TIMESTAMPTZ,
    stopped_at TIMESTAMPTZ,
    CONSTRAINT containers_status_check CHECK (
        status IN ('created', 'running', 'paused', 'restarting', 'removing', 'exited', 'dead')
    )
)
"#;

/// Host ports are unique across all records that hold one.
pub const CREATE_HOST_PORT_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_containers_host_port
    ON containers(host_port) WHERE host_port IS NOT NULL
"#;

pub const CREATE_OWNER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_containers_owner_id ON containers(owner_id)
"#;

pub const CREATE_OWNER_STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_containers_owner_status ON containers(owner_id, status)
"#;

/// Returns all schema creation statements in the correct order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_OWNERS_TABLE,
        CREATE_CONTAINERS_TABLE,
        CREATE_HOST_PORT_INDEX,
        CREATE_OWNER_INDEX,
        CREATE_OWNER_STATUS_INDEX,
    ]
}

/// Table names in the schema.
pub mod tables {
    pub const OWNERS: &str = "owners";
    pub const CONTAINERS: &str = "containers";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::record::ContainerStatus;

    #[test]
    fn test_all_schema_statements_order() {
        let statements = all_schema_statements();
        assert_eq!(statements.len(), 5);
        // Containers reference owners
        assert!(statements[0].contains(tables::OWNERS));
        assert!(statements[1].contains(tables::CONTAINERS));
        assert!(statements[2].contains("UNIQUE INDEX"));
    }

    #[test]
    fn test_status_check_covers_every_status() {
        for status in ContainerStatus::ALL {
            assert!(
                CREATE_CONTAINERS_TABLE.contains(&format!("'{}'", status.as_str())),
                "missing {status}"
            );
        }
    }

    #[test]
    fn test_one_statement_per_constant() {
        for statement in all_schema_statements() {
            assert!(!statement.trim().trim_end_matches(';').contains(';'));
        }
    }
}
