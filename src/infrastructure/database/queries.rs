//! SQL text for every statement the service issues.
//!
//! Table and column names come from [`SchemaConfig`], which has already
//! rejected anything that is not a plain identifier. Values are always bound
//! as parameters.

use crate::config::SchemaConfig;
use crate::domain::SchemaObject;

/// Statement texts built once from the schema configuration.
#[derive(Debug, Clone)]
pub struct Queries {
    // ---
    pub find_user: String,
    pub insert_user: String,
    pub update_last_ping: String,
    pub organisation_of: String,
    pub usage_exists: String,
    pub insert_usage: String,
    pub add_minutes: String,

    pub create_user_sequence: String,
    pub create_user_table: String,
    pub create_application_table: String,
    pub create_usage_sequence: String,
    pub create_usage_table: String,
    pub count_applications: String,
    pub insert_application: String,
    pub insert_unknown_organisation: String,
}

impl Queries {
    // ---
    pub fn new(s: &SchemaConfig) -> Self {
        // ---
        let user = &s.acad_user_table;
        let apps = &s.applications_table;
        let usage = &s.usage_table;
        let org = &s.organisation_table;

        Self {
            find_user: format!(
                "SELECT fid, {last_ping} AS last_ping FROM {user} WHERE {name} = $1 AND {domain} = $2",
                last_ping = s.last_ping_column,
                name = s.user_name_column,
                domain = s.domain_name_column,
            ),
            insert_user: format!(
                "INSERT INTO {user} ({name}, {domain}, {last_ping}) VALUES ($1, $2, $3)",
                name = s.user_name_column,
                domain = s.domain_name_column,
                last_ping = s.last_ping_column,
            ),
            update_last_ping: format!(
                "UPDATE {user} SET {last_ping} = $1 WHERE fid = $2",
                last_ping = s.last_ping_column,
            ),
            organisation_of: format!(
                "SELECT CAST({org_col} AS BIGINT) FROM {directory} WHERE {login} = $1 LIMIT 1",
                org_col = s.user_organisation_column,
                directory = s.user_table,
                login = s.user_login_column,
            ),
            usage_exists: format!(
                "SELECT 1 FROM {usage} WHERE {org_fid} = $1 AND {date} = $2 AND {app_fid} = $3 AND {version} = $4 LIMIT 1",
                org_fid = s.organisation_fid_column,
                date = s.usage_date_column,
                app_fid = s.application_fid_column,
                version = s.app_version_column,
            ),
            insert_usage: format!(
                "INSERT INTO {usage} ({date}, {app_fid}, {version}, {minutes}, {org_fid}) VALUES ($1, $2, $3, 0, $4)",
                date = s.usage_date_column,
                app_fid = s.application_fid_column,
                version = s.app_version_column,
                minutes = s.minutes_column,
                org_fid = s.organisation_fid_column,
            ),
            add_minutes: format!(
                "UPDATE {usage} SET {minutes} = {minutes} + $1 WHERE {date} = $2 AND {org_fid} = $3 AND {app_fid} = $4 AND {version} = $5",
                minutes = s.minutes_column,
                date = s.usage_date_column,
                org_fid = s.organisation_fid_column,
                app_fid = s.application_fid_column,
                version = s.app_version_column,
            ),

            create_user_sequence: format!("CREATE SEQUENCE {user}_seq START WITH 1"),
            create_user_table: format!(
                "CREATE TABLE {user} (\
                 fid BIGINT NOT NULL DEFAULT nextval('{user}_seq'), \
                 {name} VARCHAR(255), \
                 {domain} VARCHAR(255), \
                 {last_ping} TIMESTAMP, \
                 CONSTRAINT {user}_p PRIMARY KEY (fid), \
                 CONSTRAINT {user}_u UNIQUE ({name}, {domain}))",
                name = s.user_name_column,
                domain = s.domain_name_column,
                last_ping = s.last_ping_column,
            ),
            create_application_table: format!(
                "CREATE TABLE {apps} (\
                 fid INTEGER NOT NULL, \
                 {app_name} VARCHAR(255), \
                 CONSTRAINT {apps}_p PRIMARY KEY (fid))",
                app_name = s.app_name_column,
            ),
            create_usage_sequence: format!("CREATE SEQUENCE {usage}_seq START WITH 1"),
            create_usage_table: format!(
                "CREATE TABLE {usage} (\
                 fid BIGINT NOT NULL DEFAULT nextval('{usage}_seq'), \
                 {date} DATE, \
                 {app_fid} INTEGER, \
                 {version} VARCHAR(255), \
                 {minutes} BIGINT, \
                 {org_fid} BIGINT, \
                 CONSTRAINT {usage}_p PRIMARY KEY (fid), \
                 CONSTRAINT fk_{usage}_{app_fid} FOREIGN KEY ({app_fid}) REFERENCES {apps}(fid), \
                 CONSTRAINT fk_{usage}_{org_fid} FOREIGN KEY ({org_fid}) REFERENCES {org}(fid))",
                date = s.usage_date_column,
                app_fid = s.application_fid_column,
                version = s.app_version_column,
                minutes = s.minutes_column,
                org_fid = s.organisation_fid_column,
            ),
            count_applications: format!("SELECT COUNT(*) FROM {apps}"),
            insert_application: format!(
                "INSERT INTO {apps} (fid, {app_name}) VALUES ($1, $2)",
                app_name = s.app_name_column,
            ),
            insert_unknown_organisation: format!(
                "INSERT INTO {org} (fid, {name}, {short_name}) VALUES (-1, $1, $1)",
                name = s.organisation_name_column,
                short_name = s.organisation_short_name_column,
            ),
        }
    }

    /// DDL statement creating the given schema object.
    pub fn ddl(&self, object: SchemaObject) -> &str {
        // ---
        match object {
            SchemaObject::UserSequence => &self.create_user_sequence,
            SchemaObject::UserTable => &self.create_user_table,
            SchemaObject::ApplicationTable => &self.create_application_table,
            SchemaObject::UsageSequence => &self.create_usage_sequence,
            SchemaObject::UsageTable => &self.create_usage_table,
        }
    }
}
