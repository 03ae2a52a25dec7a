mod test_in_memory;
mod test_repository;
mod test_workdir;
