use anyhow::Result;

use crm_import::{Config, ExportTables, SupabaseStore};

fn main() -> Result<()> {
    println!("📦 CRM Import - Pipedrive → backend");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Config first: missing credentials must fail before any file is read
    let config = Config::from_env()?;

    println!("\n📂 Buscando archivos de exportación...");
    let tables = ExportTables::load(&config.export_dir)?;
    println!("✓ Cinco exportaciones cargadas");

    let store = SupabaseStore::new(&config)?;
    crm_import::run(&store, &tables)?;

    Ok(())
}
