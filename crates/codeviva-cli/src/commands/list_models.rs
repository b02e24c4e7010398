//! The `codeviva list-models` command.

use anyhow::Result;

use codeviva_providers::{create_provider, load_config_from};

use crate::ProviderArgs;

pub fn execute(args: ProviderArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    let mut found_any = false;

    for name in names {
        if args.provider.as_ref().is_some_and(|filter| filter != name) {
            continue;
        }

        let provider = create_provider(&config.providers[name])?;
        let models = provider.available_models();

        if !models.is_empty() {
            found_any = true;
            let marker = if *name == config.default_provider {
                " (default)"
            } else {
                ""
            };
            println!("Provider: {name}{marker}");
            for model in &models {
                let speech = if model.speech { ", speech" } else { "" };
                println!(
                    "  {}: {} ({}K context{speech})",
                    model.id,
                    model.name,
                    model.max_context / 1000,
                );
            }
            println!();
        }
    }

    if !found_any {
        println!("No providers configured. Run `codeviva init` to create a config file.");
    }

    Ok(())
}
