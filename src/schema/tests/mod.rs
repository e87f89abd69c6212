mod tests_columns;
