use std::path::PathBuf;

use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};
use crate::store::SqliteStore;

pub fn run(data_dir: Option<String>, tenant: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    if let Some(tenant) = tenant {
        settings.tenant = tenant;
    }

    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;
    std::fs::create_dir_all(resolved.join("exports"))?;
    SqliteStore::open(&settings.db_path())?;
    save_settings(&settings)?;

    println!(
        "Initialized ledgerlens at {} (tenant '{}')",
        resolved.display(),
        settings.tenant
    );
    Ok(())
}
