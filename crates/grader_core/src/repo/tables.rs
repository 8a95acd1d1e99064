//! Per-kind SQL mapping for hierarchy records.
//!
//! # Responsibility
//! - Map each record kind to its table columns.
//! - Convert between rows, records and change snapshots.
//!
//! # Invariants
//! - Reads reject invalid persisted state instead of masking it.
//! - `update_row` never touches derived averages or the soft-delete flag.

use crate::aggregate::Average;
use crate::model::division::Division;
use crate::model::entity::{GradeEntity, RecordId};
use crate::model::exam::Exam;
use crate::model::module::Module;
use crate::model::school::School;
use crate::repo::changes::ChildSnapshot;
use crate::repo::{StoreError, StoreResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Storage mapping implemented by the four record kinds.
pub trait StoredEntity: GradeEntity {
    /// Select list, in the order `from_row` reads it.
    const COLUMNS: &'static str;

    /// Inserts a new row at `sort_order` within its parent.
    fn insert_row(&self, conn: &Connection, sort_order: i64) -> rusqlite::Result<usize>;
    /// Updates user-editable fields, the parent link and `included`.
    fn update_row(&self, conn: &Connection) -> rusqlite::Result<usize>;
    /// Parses one row selected with [`Self::COLUMNS`].
    fn from_row(row: &Row<'_>) -> StoreResult<Self>;
    /// Resets flags that a fresh record must not carry.
    fn reset_for_insert(&mut self);
    fn into_snapshot(records: Vec<Self>) -> ChildSnapshot;
    fn from_snapshot(snapshot: ChildSnapshot) -> Option<Vec<Self>>;
}

impl StoredEntity for School {
    const COLUMNS: &'static str = "id, name, address, zip_code, city, description, \
        is_selected, grade, grade_defined, on_delete";

    fn insert_row(&self, conn: &Connection, sort_order: i64) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO schools (
                id, name, address, zip_code, city, description,
                is_selected, grade, grade_defined, on_delete, sort_order
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0.0, 0, 0, ?8);",
            params![
                self.id.to_string(),
                self.name,
                self.address,
                self.zip_code,
                self.city,
                self.description.as_deref(),
                bool_to_int(self.included),
                sort_order,
            ],
        )
    }

    fn update_row(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE schools
             SET name = ?2,
                 address = ?3,
                 zip_code = ?4,
                 city = ?5,
                 description = ?6,
                 is_selected = ?7,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                self.id.to_string(),
                self.name,
                self.address,
                self.zip_code,
                self.city,
                self.description.as_deref(),
                bool_to_int(self.included),
            ],
        )
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        Ok(Self {
            id: parse_uuid(&row.get::<_, String>("id")?, "schools.id")?,
            name: row.get("name")?,
            address: row.get("address")?,
            zip_code: row.get("zip_code")?,
            city: row.get("city")?,
            description: row.get("description")?,
            included: parse_flag(row.get("is_selected")?, "schools.is_selected")?,
            stored_average: parse_average(row, "schools")?,
            is_deleted: parse_flag(row.get("on_delete")?, "schools.on_delete")?,
        })
    }

    fn reset_for_insert(&mut self) {
        self.is_deleted = false;
        self.stored_average = Average::UNDEFINED;
    }

    fn into_snapshot(records: Vec<Self>) -> ChildSnapshot {
        ChildSnapshot::Schools(records)
    }

    fn from_snapshot(snapshot: ChildSnapshot) -> Option<Vec<Self>> {
        match snapshot {
            ChildSnapshot::Schools(records) => Some(records),
            _ => None,
        }
    }
}

impl StoredEntity for Division {
    const COLUMNS: &'static str = "id, school_id, name, description, school_year, \
        is_selected, grade, grade_defined, on_delete";

    fn insert_row(&self, conn: &Connection, sort_order: i64) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO divisions (
                id, school_id, name, description, school_year,
                is_selected, grade, grade_defined, on_delete, sort_order
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0.0, 0, 0, ?7);",
            params![
                self.id.to_string(),
                self.school_id.to_string(),
                self.name,
                self.description.as_deref(),
                self.school_year,
                bool_to_int(self.included),
                sort_order,
            ],
        )
    }

    fn update_row(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE divisions
             SET school_id = ?2,
                 name = ?3,
                 description = ?4,
                 school_year = ?5,
                 is_selected = ?6,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                self.id.to_string(),
                self.school_id.to_string(),
                self.name,
                self.description.as_deref(),
                self.school_year,
                bool_to_int(self.included),
            ],
        )
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        Ok(Self {
            id: parse_uuid(&row.get::<_, String>("id")?, "divisions.id")?,
            school_id: parse_uuid(&row.get::<_, String>("school_id")?, "divisions.school_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            school_year: row.get("school_year")?,
            included: parse_flag(row.get("is_selected")?, "divisions.is_selected")?,
            stored_average: parse_average(row, "divisions")?,
            is_deleted: parse_flag(row.get("on_delete")?, "divisions.on_delete")?,
        })
    }

    fn reset_for_insert(&mut self) {
        self.is_deleted = false;
        self.stored_average = Average::UNDEFINED;
    }

    fn into_snapshot(records: Vec<Self>) -> ChildSnapshot {
        ChildSnapshot::Divisions(records)
    }

    fn from_snapshot(snapshot: ChildSnapshot) -> Option<Vec<Self>> {
        match snapshot {
            ChildSnapshot::Divisions(records) => Some(records),
            _ => None,
        }
    }
}

impl StoredEntity for Module {
    const COLUMNS: &'static str =
        "id, division_id, name, description, is_selected, grade, grade_defined, on_delete";

    fn insert_row(&self, conn: &Connection, sort_order: i64) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO modules (
                id, division_id, name, description,
                is_selected, grade, grade_defined, on_delete, sort_order
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0.0, 0, 0, ?6);",
            params![
                self.id.to_string(),
                self.division_id.to_string(),
                self.name,
                self.description.as_deref(),
                bool_to_int(self.included),
                sort_order,
            ],
        )
    }

    fn update_row(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE modules
             SET division_id = ?2,
                 name = ?3,
                 description = ?4,
                 is_selected = ?5,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                self.id.to_string(),
                self.division_id.to_string(),
                self.name,
                self.description.as_deref(),
                bool_to_int(self.included),
            ],
        )
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        Ok(Self {
            id: parse_uuid(&row.get::<_, String>("id")?, "modules.id")?,
            division_id: parse_uuid(
                &row.get::<_, String>("division_id")?,
                "modules.division_id",
            )?,
            name: row.get("name")?,
            description: row.get("description")?,
            included: parse_flag(row.get("is_selected")?, "modules.is_selected")?,
            stored_average: parse_average(row, "modules")?,
            is_deleted: parse_flag(row.get("on_delete")?, "modules.on_delete")?,
        })
    }

    fn reset_for_insert(&mut self) {
        self.is_deleted = false;
        self.stored_average = Average::UNDEFINED;
    }

    fn into_snapshot(records: Vec<Self>) -> ChildSnapshot {
        ChildSnapshot::Modules(records)
    }

    fn from_snapshot(snapshot: ChildSnapshot) -> Option<Vec<Self>> {
        match snapshot {
            ChildSnapshot::Modules(records) => Some(records),
            _ => None,
        }
    }
}

impl StoredEntity for Exam {
    const COLUMNS: &'static str =
        "id, module_id, name, description, exam_date, grade, weight, is_selected, on_delete";

    fn insert_row(&self, conn: &Connection, sort_order: i64) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO exams (
                id, module_id, name, description, exam_date,
                grade, weight, is_selected, on_delete, sort_order
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9);",
            params![
                self.id.to_string(),
                self.module_id.to_string(),
                self.name,
                self.description.as_deref(),
                self.date.format(DATE_FORMAT).to_string(),
                self.grade,
                self.weight,
                bool_to_int(self.included),
                sort_order,
            ],
        )
    }

    fn update_row(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE exams
             SET module_id = ?2,
                 name = ?3,
                 description = ?4,
                 exam_date = ?5,
                 grade = ?6,
                 weight = ?7,
                 is_selected = ?8,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                self.id.to_string(),
                self.module_id.to_string(),
                self.name,
                self.description.as_deref(),
                self.date.format(DATE_FORMAT).to_string(),
                self.grade,
                self.weight,
                bool_to_int(self.included),
            ],
        )
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        let date_text: String = row.get("exam_date")?;
        let date = NaiveDate::parse_from_str(&date_text, DATE_FORMAT).map_err(|_| {
            StoreError::InvalidData(format!("invalid date `{date_text}` in exams.exam_date"))
        })?;

        Ok(Self {
            id: parse_uuid(&row.get::<_, String>("id")?, "exams.id")?,
            module_id: parse_uuid(&row.get::<_, String>("module_id")?, "exams.module_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            date,
            grade: row.get("grade")?,
            weight: row.get("weight")?,
            included: parse_flag(row.get("is_selected")?, "exams.is_selected")?,
            is_deleted: parse_flag(row.get("on_delete")?, "exams.on_delete")?,
        })
    }

    fn reset_for_insert(&mut self) {
        self.is_deleted = false;
    }

    fn into_snapshot(records: Vec<Self>) -> ChildSnapshot {
        ChildSnapshot::Exams(records)
    }

    fn from_snapshot(snapshot: ChildSnapshot) -> Option<Vec<Self>> {
        match snapshot {
            ChildSnapshot::Exams(records) => Some(records),
            _ => None,
        }
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

pub(crate) fn parse_flag(value: i64, column: &'static str) -> StoreResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StoreError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> StoreResult<RecordId> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn parse_average(row: &Row<'_>, table: &'static str) -> StoreResult<Average> {
    let value: f64 = row.get("grade")?;
    let defined = match row.get::<_, i64>("grade_defined")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid grade_defined value `{other}` in {table}.grade_defined"
            )));
        }
    };
    Ok(Average::from_stored(value, defined))
}
