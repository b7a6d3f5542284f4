pub mod app;
pub mod renderer;
pub mod scene;

use color_eyre::Result;
use app::{App, AppConfig};

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let mut app = App::new(AppConfig::default())?;
    app.run()?;

    Ok(())
}
