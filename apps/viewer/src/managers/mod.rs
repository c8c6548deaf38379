pub mod wall_manager;
