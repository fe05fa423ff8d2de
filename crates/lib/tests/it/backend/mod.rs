mod in_memory;
mod save_load;
