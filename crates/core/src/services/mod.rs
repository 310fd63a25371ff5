pub mod aggregation_service;
pub mod chart_service;
pub mod portfolio_service;
pub mod quote_service;
