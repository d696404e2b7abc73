//! Filters Command
//!
//! Prints the trading rules the grid quantizes against, which is handy when
//! choosing an investment amount above the symbol's minimum notional.

use anyhow::{Context, Result};
use tracing::info;

use spot_grid::binance::{BinanceClient, ClientConfig};
use spot_grid::exchange::ExchangeClient;
use spot_grid::Config;

pub fn run(symbol: String, config_path: Option<String>) -> Result<()> {
    let client_config = match config_path {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?
            .exchange
            .client_config(),
        None => ClientConfig::default(),
    };

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(async move {
        let client = BinanceClient::public(client_config)?;
        let symbol = symbol.to_uppercase();

        let filters = client.get_symbol_filters(&symbol).await?;
        let price = client.get_price(&symbol).await?;

        info!("{} @ {}", symbol, price);
        println!("Symbol:        {}", symbol);
        println!("Last price:    {}", price);
        println!("Min quantity:  {}", filters.min_qty());
        println!("Step size:     {}", filters.step_size());
        println!("Min price:     {}", filters.min_price());
        println!("Tick size:     {}", filters.tick_size());
        println!("Min notional:  {}", filters.min_notional());
        Ok(())
    })
}
