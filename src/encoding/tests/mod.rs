mod tests_primitives;
mod tests_varint;
