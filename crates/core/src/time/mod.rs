pub mod utc_date;
