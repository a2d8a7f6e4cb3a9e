//! Settings singleton: read frequently, mutated only by explicit admin ops.

use crate::error::Result;
use crate::model::Settings;

impl super::Db {
    /// Read the settings row. The migration seeds it; defaults cover a
    /// freshly truncated table.
    pub async fn get_settings(&self) -> Result<Settings> {
        let row: Option<SettingsRow> = sqlx::query_as(
            "SELECT avg_service_minutes, open, passcode, display_name FROM settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SettingsRow::into_settings).unwrap_or(Settings {
            avg_service_minutes: 12.0,
            open: true,
            passcode: "demo".to_string(),
            display_name: "Walk-in Queue".to_string(),
        }))
    }

    /// Replace the admin passcode.
    pub async fn set_passcode(&self, passcode: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (id, passcode) VALUES (1, $1)
             ON CONFLICT (id) DO UPDATE SET passcode = EXCLUDED.passcode",
        )
        .bind(passcode)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update the operational settings (not the passcode).
    pub async fn update_settings(
        &self,
        avg_service_minutes: f64,
        open: bool,
        display_name: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE settings SET avg_service_minutes = $1, open = $2, display_name = $3 WHERE id = 1",
        )
        .bind(avg_service_minutes)
        .bind(open)
        .bind(display_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    avg_service_minutes: f64,
    open: bool,
    passcode: String,
    display_name: String,
}

impl SettingsRow {
    fn into_settings(self) -> Settings {
        Settings {
            avg_service_minutes: self.avg_service_minutes,
            open: self.open,
            passcode: self.passcode,
            display_name: self.display_name,
        }
    }
}
