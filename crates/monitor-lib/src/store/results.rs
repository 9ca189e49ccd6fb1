//! Canonical result records backed by the `results` table

use super::{ResultStore, StateDb};
use crate::error::StoreError;
use crate::models::ClassificationResult;
use rusqlite::params;

impl ResultStore for StateDb {
    fn insert(&self, result: &ClassificationResult) -> Result<i64, StoreError> {
        let payload = serde_json::to_string(result)?;
        let created_at = chrono::Utc::now().timestamp();

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO results (created_at, file_path, flow_index, rf_prob, rf_label,
                                 xgb_prob, xgb_label, decision, payload_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                created_at,
                result.source_file,
                result.flow_index as i64,
                result.rf_prob,
                result.rf_label,
                result.xgb_prob,
                result.xgb_label,
                result.decision.as_str(),
                payload,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn count_results(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_attacks(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM results WHERE decision = 'ATTACK'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decision;

    fn result(flow_index: u64, decision: Decision) -> ClassificationResult {
        ClassificationResult {
            timestamp: "2024-05-01T12:00:00+00:00".to_string(),
            source_file: "/flows/a.csv".to_string(),
            flow_index,
            rf_prob: 0.75,
            rf_label: "DrDoS_DNS".to_string(),
            xgb_prob: 0.25,
            xgb_label: "BENIGN".to_string(),
            decision,
        }
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let db = StateDb::open_in_memory().unwrap();
        let first = db.insert(&result(0, Decision::Attack)).unwrap();
        let second = db.insert(&result(1, Decision::Benign)).unwrap();

        assert!(second > first);
        assert_eq!(db.count_results().unwrap(), 2);
        assert_eq!(db.count_attacks().unwrap(), 1);
    }

    #[test]
    fn test_payload_and_fields_are_stored() {
        let db = StateDb::open_in_memory().unwrap();
        let stored = result(17, Decision::Attack);
        let id = db.insert(&stored).unwrap();

        let conn = db.lock().unwrap();
        let (flow_index, decision, payload): (i64, String, String) = conn
            .query_row(
                "SELECT flow_index, decision, payload_json FROM results WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();

        assert_eq!(flow_index, 17);
        assert_eq!(decision, "ATTACK");
        let decoded: ClassificationResult = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded, stored);
    }
}
