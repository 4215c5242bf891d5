mod test_alert_scenarios;
mod test_retrain_isolation;
