//! Show command - print the cached content of one slot

use crate::cache::CacheSlot;
use crate::cli::args::ShowArgs;
use crate::config::Config;
use crate::descriptor::CacheKey;
use crate::error::{RegcacheError, RegcacheResult};

/// Execute the show command
pub async fn execute(args: ShowArgs, config: &Config) -> RegcacheResult<()> {
    let key = CacheKey::new(&args.app, &args.job, &args.tag);
    key.validate()?;

    let root = args.cache_root.unwrap_or_else(|| config.cache.root.clone());
    let slot = CacheSlot::new(&root, key);

    let content = if args.readme {
        slot.read_readme()
            .await?
            .ok_or_else(|| RegcacheError::SlotNotFound(slot.readme_path()))?
    } else {
        let name = args
            .file
            .unwrap_or_else(|| config.cache.build_definition_name.clone());
        slot.read_build_definition(&name).await?
    };

    print!("{}", content);
    Ok(())
}
