/// The last path segment of a type name without generic arguments, e.g. `Person`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let name = std::any::type_name::<T>();
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::short_type_name;

    #[test]
    fn test_short_type_name() {
        struct Person;
        assert_eq!(short_type_name::<Person>(), "Person");
        assert_eq!(short_type_name::<Vec<Person>>(), "Vec");
        assert_eq!(short_type_name::<u8>(), "u8");
    }
}
